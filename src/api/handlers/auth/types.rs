//! Request/response bodies that only exist at the HTTP boundary.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::UserProfile;

#[derive(ToSchema, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub message: String,
    pub revoked_sessions: u64,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub phone: String,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ActivationRequest {
    pub is_active: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
