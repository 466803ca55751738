use thiserror::Error;

/// Failures surfaced by the session and account flows.
///
/// Credential and token failures are deliberately generic. Account-state and
/// code-expiry failures are specific because they tell a legitimate user what
/// to do next.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("please verify your account first")]
    AccountNotVerified,
    #[error("account is pending admin activation")]
    AccountInactive,
    #[error("invalid or expired token")]
    TokenInvalid,
    #[error("code has expired, please request a new one")]
    CodeExpired,
    #[error("an account with this email or phone already exists")]
    Conflict,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("service temporarily unavailable, please try again")]
    Unavailable,
}

impl AuthError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountNotVerified => "account_not_verified",
            Self::AccountInactive => "account_inactive",
            Self::TokenInvalid => "token_invalid",
            Self::CodeExpired => "code_expired",
            Self::Conflict => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::Unavailable => "unavailable",
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
