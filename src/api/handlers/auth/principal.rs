//! Bearer authentication for protected routes.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::error;

use crate::auth::{AuthError, AuthService, Identity};

/// Caller resolved from `Authorization: Bearer <access token>`.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: Identity,
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let access_token = bearer_token(&parts.headers).ok_or(AuthError::TokenInvalid)?;
        let Some(auth) = parts.extensions.get::<Arc<AuthService>>().cloned() else {
            error!("auth service extension missing");
            return Err(AuthError::Unavailable);
        };
        let identity = auth.sessions().authenticate(&access_token).await?;
        Ok(Self {
            identity,
            access_token,
        })
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
