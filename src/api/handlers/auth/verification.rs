use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::{
    error::ErrorBody,
    required,
    types::{MessageResponse, ResendVerificationRequest, VerifyRequest, VerifyResponse},
};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Account verified", body = VerifyResponse),
        (status = 400, description = "Code expired, request a new one", body = ErrorBody),
        (status = 404, description = "Unknown code", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn verify(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<VerifyRequest>>,
) -> Result<Json<VerifyResponse>, AuthError> {
    let request = required(payload)?;
    let user = auth.accounts().verify_account(&request.code).await?;
    Ok(Json(VerifyResponse {
        message: "Account verified successfully".to_string(),
        user,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "New code sent", body = MessageResponse),
        (status = 400, description = "Invalid phone or account already verified", body = ErrorBody),
        (status = 404, description = "No account with this phone", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = required(payload)?;
    auth.accounts()
        .resend_verification_code(&request.phone)
        .await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}
