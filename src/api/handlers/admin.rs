//! Staff-only account administration.

use axum::{
    extract::{Extension, Path},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{error::ErrorBody, required, types::ActivationRequest, Principal};
use crate::auth::{AuthError, AuthService, UserProfile};

#[utoipa::path(
    put,
    path = "/v1/admin/users/{id}/activation",
    params(("id" = Uuid, Path, description = "Account to (de)activate")),
    request_body = ActivationRequest,
    responses(
        (status = 200, description = "Activation updated", body = UserProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Caller is not staff", body = ErrorBody),
        (status = 404, description = "Unknown account", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn set_activation(
    Extension(auth): Extension<Arc<AuthService>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    payload: Option<Json<ActivationRequest>>,
) -> Result<Json<UserProfile>, AuthError> {
    let request = required(payload)?;
    auth.accounts()
        .set_activation(&principal.identity, id, request.is_active)
        .await
        .map(Json)
}
