//! HTTP mapping for [`AuthError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::auth::AuthError;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `token_invalid`.
    pub error: String,
    pub message: String,
}

#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials | AuthError::TokenInvalid => StatusCode::UNAUTHORIZED,
        AuthError::AccountNotVerified | AuthError::AccountInactive | AuthError::Forbidden(_) => {
            StatusCode::FORBIDDEN
        }
        AuthError::Conflict => StatusCode::CONFLICT,
        AuthError::Validation(_) | AuthError::CodeExpired => StatusCode::BAD_REQUEST,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        debug!(status = status.as_u16(), code = self.code(), "request rejected");
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
