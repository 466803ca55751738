use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::{
    error::ErrorBody,
    required,
    types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest},
};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Same answer whether or not the account exists", body = MessageResponse),
        (status = 400, description = "Neither email nor phone supplied", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = required(payload)?;
    let message = auth
        .accounts()
        .forgot_password(request.email.as_deref(), request.phone.as_deref())
        .await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced, every session revoked", body = MessageResponse),
        (status = 400, description = "Passwords differ or violate the policy", body = ErrorBody),
        (status = 401, description = "Invalid or expired reset token", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = required(payload)?;
    auth.accounts()
        .reset_password(
            &request.token,
            &request.new_password,
            &request.confirm_password,
        )
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}
