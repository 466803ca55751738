//! Token refresh, logout and the current-user endpoint.

use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::{
    error::ErrorBody,
    required,
    types::{LogoutRequest, LogoutResponse, RefreshRequest},
    Principal,
};
use crate::auth::{AuthError, AuthService, TokenPair, UserProfile};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPair),
        (status = 401, description = "Invalid, expired or already used refresh token", body = ErrorBody),
        (status = 403, description = "Account deactivated", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn refresh(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let request = required(payload)?;
    auth.sessions()
        .refresh(request.refresh_token.trim())
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body(content = LogoutRequest, description = "Optional refresh token to revoke"),
    responses(
        (status = 200, description = "All sessions of the caller revoked", body = LogoutResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    Extension(auth): Extension<Arc<AuthService>>,
    principal: Principal,
    payload: Option<Json<LogoutRequest>>,
) -> Json<LogoutResponse> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let refresh_token = request
        .refresh_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty());
    let revoked_sessions = auth
        .sessions()
        .logout(
            principal.identity.id,
            &principal.access_token,
            refresh_token,
        )
        .await;
    Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
        revoked_sessions,
    })
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Account deactivated", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(principal: Principal) -> Json<UserProfile> {
    Json(principal.identity.profile())
}
