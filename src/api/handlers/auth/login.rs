use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::{error::ErrorBody, required};
use crate::auth::{AuthError, AuthService, LoginOutcome, LoginRequest};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginOutcome),
        (status = 400, description = "Neither email nor phone supplied", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account not verified or pending activation", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginOutcome>, AuthError> {
    let request = required(payload)?;
    auth.sessions().login(request).await.map(Json)
}
