use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;

use super::{error::ErrorBody, required};
use crate::auth::{AuthError, AuthService, RegistrationOutcome, RegistrationRequest};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegistrationRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = RegistrationOutcome),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "Staff accounts cannot self-register", body = ErrorBody),
        (status = 409, description = "Email or phone already registered", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<RegistrationRequest>>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), AuthError> {
    let request = required(payload)?;
    let outcome = auth.accounts().register(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
