//! Login, refresh rotation, logout and the per-request guard.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    audit::{emit, AuditEvent, AuditRecord},
    bounded::{bounded, revocation_write},
    config::AuthConfig,
    credentials::{CredentialValidator, LoginIdentifier},
    error::AuthError,
    identity::{Identity, UserProfile},
    token::{TokenIssuer, TokenPair},
    utils::{normalize_email, normalize_phone},
    Collaborators,
};

// Blacklist entries shorter than this are not worth a write.
const MIN_BLACKLIST_TTL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
    pub device_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: UserProfile,
    pub requires_verification: bool,
    /// Staff account without a staff profile yet; the client should redirect
    /// to profile completion.
    pub requires_staff_profile: bool,
}

pub struct SessionOrchestrator {
    config: Arc<AuthConfig>,
    validator: Arc<CredentialValidator>,
    issuer: Arc<TokenIssuer>,
    collaborators: Collaborators,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        validator: Arc<CredentialValidator>,
        issuer: Arc<TokenIssuer>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            validator,
            issuer,
            collaborators,
        }
    }

    async fn read<T, Fut>(&self, what: &'static str, call: Fut) -> Result<T, AuthError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        bounded(self.config.store_timeout(), what, call).await
    }

    async fn audit(&self, record: AuditRecord) {
        emit(
            self.collaborators.audit.as_ref(),
            self.config.store_timeout(),
            record,
        )
        .await;
    }

    /// Email wins when both are supplied. A phone that cannot be normalized is
    /// looked up verbatim so it misses like any other unknown identifier.
    fn identifier(&self, request: &LoginRequest) -> Result<LoginIdentifier, AuthError> {
        let email = request.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let phone = request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        match (email, phone) {
            (Some(email), _) => Ok(LoginIdentifier::Email(normalize_email(email))),
            (None, Some(phone)) => Ok(LoginIdentifier::Phone(
                normalize_phone(phone, self.config.default_country_code())
                    .unwrap_or_else(|| phone.to_string()),
            )),
            (None, None) => Err(AuthError::validation("email or phone is required")),
        }
    }

    /// Verify credentials and account state, then issue a token pair.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] for any identifier/password miss;
    /// [`AuthError::AccountNotVerified`] or [`AuthError::AccountInactive`] when
    /// the account may not hold a session yet.
    #[instrument(skip_all, fields(device_id = request.device_id.as_deref()))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AuthError> {
        let identifier = self.identifier(&request)?;
        let Some(mut identity) = self
            .validator
            .validate(&identifier, &request.password)
            .await?
        else {
            return Err(AuthError::InvalidCredentials);
        };

        if !identity.role.is_staff() && !identity.is_verified {
            return Err(AuthError::AccountNotVerified);
        }
        if !identity.is_active {
            return Err(AuthError::AccountInactive);
        }

        let now = Utc::now();
        self.read(
            "touch_last_login",
            self.collaborators.users.touch_last_login(identity.id, now),
        )
        .await?;
        identity.last_login_at = Some(now);

        let requires_staff_profile = if identity.role.is_staff() {
            !self
                .read(
                    "staff_profile_exists",
                    self.collaborators.staff_profiles.exists(identity.id),
                )
                .await?
        } else {
            false
        };

        let tokens = self.issuer.issue(&identity).await?;

        self.audit(AuditRecord::by_self(
            identity.id,
            AuditEvent::LoginSucceeded {
                device_id: request.device_id.clone(),
                at: now,
            },
        ))
        .await;
        info!(user_id = %identity.id, role = %identity.role, "login succeeded");

        Ok(LoginOutcome {
            tokens,
            user: identity.profile(),
            requires_verification: !identity.is_verified,
            requires_staff_profile,
        })
    }

    /// Exchange a refresh token for a new pair, invalidating the old one.
    ///
    /// The old token is claimed with an atomic set-if-absent before anything is
    /// issued, so of two concurrent calls with the same token only one wins.
    ///
    /// # Errors
    /// [`AuthError::TokenInvalid`] for a bad, expired, revoked or already used
    /// token; [`AuthError::AccountInactive`] if the owner was deactivated;
    /// [`AuthError::Unavailable`] if revocation state cannot be checked.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let revocations = &self.collaborators.revocations;

        if self
            .read("is_blacklisted", revocations.is_blacklisted(refresh_token))
            .await?
        {
            debug!("refresh token already invalidated");
            return Err(AuthError::TokenInvalid);
        }

        let claims = self.issuer.verify_refresh(refresh_token)?;

        if !self
            .read(
                "is_user_token_live",
                revocations.is_user_token_live(claims.sub, refresh_token),
            )
            .await?
        {
            debug!(user_id = %claims.sub, "refresh token no longer indexed");
            return Err(AuthError::TokenInvalid);
        }

        let identity = self
            .read("find_by_id", self.collaborators.users.find_by_id(claims.sub))
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if !identity.is_active {
            return Err(AuthError::AccountInactive);
        }

        let ttl = claims.remaining().max(MIN_BLACKLIST_TTL);
        let claimed = self
            .read(
                "blacklist_if_absent",
                revocations.blacklist_if_absent(refresh_token, ttl),
            )
            .await?;
        if !claimed {
            warn!(user_id = %identity.id, "concurrent reuse of refresh token rejected");
            return Err(AuthError::TokenInvalid);
        }

        revocation_write(
            self.config.store_timeout(),
            self.config.store_write_attempts(),
            "remove_user_token",
            identity.id,
            || revocations.remove_user_token(identity.id, refresh_token),
        )
        .await;

        let tokens = self.issuer.issue(&identity).await?;

        self.audit(AuditRecord::by_self(identity.id, AuditEvent::TokenRefreshed))
            .await;
        debug!(user_id = %identity.id, "refresh token rotated");

        Ok(tokens)
    }

    /// Invalidate the presented tokens and every indexed session of the user.
    ///
    /// Revocation writes are retried; if they still fail the logout succeeds
    /// anyway and the failure is logged as a security anomaly. Returns the
    /// number of indexed sessions revoked.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn logout(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> u64 {
        let revocations = &self.collaborators.revocations;
        let timeout = self.config.store_timeout();
        let attempts = self.config.store_write_attempts();

        let access_ttl = self
            .issuer
            .verify_access(access_token)
            .map_or_else(|_| self.issuer.access_ttl(), |claims| claims.remaining())
            .max(MIN_BLACKLIST_TTL);
        revocation_write(timeout, attempts, "blacklist_access", user_id, || {
            revocations.blacklist(access_token, access_ttl)
        })
        .await;

        if let Some(refresh_token) = refresh_token {
            let refresh_ttl = self
                .issuer
                .verify_refresh(refresh_token)
                .map_or_else(|_| self.issuer.refresh_ttl(), |claims| claims.remaining())
                .max(MIN_BLACKLIST_TTL);
            revocation_write(timeout, attempts, "blacklist_refresh", user_id, || {
                revocations.blacklist(refresh_token, refresh_ttl)
            })
            .await;
        }

        // Logout ends every session of the user, not just this device's.
        let revoked_sessions = revocation_write(timeout, attempts, "revoke_all", user_id, || {
            revocations.revoke_all_user_tokens(user_id)
        })
        .await
        .unwrap_or(0);

        self.audit(AuditRecord::by_self(
            user_id,
            AuditEvent::LoggedOut { revoked_sessions },
        ))
        .await;
        info!(revoked_sessions, "logged out");

        revoked_sessions
    }

    /// Per-request guard: resolve a bearer access token to its identity.
    ///
    /// # Errors
    /// [`AuthError::TokenInvalid`] for a bad, expired or revoked token or a
    /// vanished subject; [`AuthError::AccountInactive`] for a deactivated
    /// account; [`AuthError::Unavailable`] when revocation state cannot be read.
    pub async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError> {
        let claims = self.issuer.verify_access(access_token)?;

        if self
            .read(
                "is_blacklisted",
                self.collaborators.revocations.is_blacklisted(access_token),
            )
            .await?
        {
            return Err(AuthError::TokenInvalid);
        }

        let identity = self
            .read("find_by_id", self.collaborators.users.find_by_id(claims.sub))
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if !identity.is_active {
            return Err(AuthError::AccountInactive);
        }
        Ok(identity)
    }

    /// Fingerprints of the user's live refresh tokens.
    ///
    /// # Errors
    /// [`AuthError::Unavailable`] when the store cannot be read.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<String>, AuthError> {
        self.read(
            "list_user_tokens",
            self.collaborators.revocations.list_user_tokens(user_id),
        )
        .await
    }
}
