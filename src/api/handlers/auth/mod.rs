//! `/v1/auth/*` endpoints.

pub mod error;
pub mod login;
pub mod password;
pub mod principal;
pub mod register;
pub mod session;
pub mod types;
pub mod verification;

pub use principal::Principal;

use axum::Json;

use crate::auth::AuthError;

/// Unwrap an optional JSON body; a missing or malformed one is a validation error.
pub(crate) fn required<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| AuthError::validation("missing or malformed payload"))
}
