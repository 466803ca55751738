//! Registration, verification codes, password reset and administrative
//! activation.
//!
//! One-time codes live on the identity record with an explicit expiry and are
//! cleared as soon as they are used. Outbound messages go through
//! [`dispatch`], so delivery problems are logged and never fail the flow.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    audit::{emit, AuditEvent, AuditRecord},
    bounded::{bounded, revocation_write},
    config::AuthConfig,
    credentials::hash_password,
    directory::InsertOutcome,
    error::AuthError,
    identity::{Identity, Role, UserProfile},
    notify::{dispatch, Channel},
    token::{TokenIssuer, TokenPair},
    utils::{
        generate_reset_token, generate_verification_code, normalize_email, normalize_phone,
        valid_email, valid_password,
    },
    Collaborators,
};

/// Returned by forgot-password whether or not an account matched.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists with the provided details, password reset instructions have been sent";

const DEFAULT_LANGUAGE: &str = "en";

// Draws before giving up on finding a code no live account holds.
const CODE_DRAWS: usize = 5;

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct RegistrationRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
    pub full_name: String,
    /// Defaults to `donor`; staff accounts cannot self-register.
    pub role: Option<Role>,
    pub language: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct RegistrationOutcome {
    pub tokens: TokenPair,
    pub user: UserProfile,
    pub verification_required: bool,
}

pub struct AccountLifecycleManager {
    config: Arc<AuthConfig>,
    issuer: Arc<TokenIssuer>,
    collaborators: Collaborators,
}

impl AccountLifecycleManager {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        issuer: Arc<TokenIssuer>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            issuer,
            collaborators,
        }
    }

    async fn store<T, Fut>(&self, what: &'static str, call: Fut) -> Result<T, AuthError>
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

    fn expiry(&self, ttl_seconds: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::seconds(ttl_seconds)
    }

    fn phone(&self, phone: &str) -> Result<String, AuthError> {
        normalize_phone(phone, self.config.default_country_code())
            .ok_or_else(|| AuthError::validation("invalid phone number"))
    }

    /// A code no other account currently holds unexpired.
    async fn fresh_code(&self) -> Result<String, AuthError> {
        for _ in 0..CODE_DRAWS {
            let code = generate_verification_code(self.config.verification_code_length());
            let holder = self
                .store(
                    "find_by_verification_code",
                    self.collaborators.users.find_by_verification_code(&code),
                )
                .await?;
            let live = holder.is_some_and(|holder| {
                holder
                    .verification_code_expires_at
                    .is_some_and(|expires_at| expires_at > Utc::now())
            });
            if !live {
                return Ok(code);
            }
        }
        warn!("verification code space exhausted after {CODE_DRAWS} draws");
        Err(AuthError::Unavailable)
    }

    fn send_code(&self, identity: &Identity, channel: Channel, code: String) {
        let gateway = self.collaborators.notifications.clone();
        let identity = identity.clone();
        dispatch("verification_code", identity.id, async move {
            gateway.send_verification_code(&identity, channel, &code).await
        });
    }

    /// Create an unverified account and hand back a token pair right away.
    ///
    /// # Errors
    /// [`AuthError::Forbidden`] for a staff role, [`AuthError::Validation`] for
    /// malformed input and [`AuthError::Conflict`] when the email or phone is
    /// already registered.
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationOutcome, AuthError> {
        let raw_phone = request
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .ok_or_else(|| AuthError::validation("phone is required"))?;

        let role = request.role.unwrap_or(Role::Donor);
        if role.is_staff() {
            return Err(AuthError::Forbidden("staff accounts cannot self-register"));
        }

        if !valid_password(&request.password) {
            return Err(AuthError::validation(
                "password must be between 8 and 128 characters",
            ));
        }

        let phone = self.phone(raw_phone)?;
        let email = match request.email.as_deref().map(normalize_email) {
            Some(email) if email.is_empty() => None,
            Some(email) if !valid_email(&email) => {
                return Err(AuthError::validation("invalid email address"));
            }
            email => email,
        };
        let full_name = request.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(AuthError::validation("full name is required"));
        }

        if self
            .store(
                "find_by_email_or_phone",
                self.collaborators
                    .users
                    .find_by_email_or_phone(email.as_deref(), Some(&phone)),
            )
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict);
        }

        let password_hash = hash(request.password).await?;
        let code = self.fresh_code().await?;
        let identity = Identity {
            id: Uuid::now_v7(),
            email,
            phone: Some(phone),
            password_hash,
            full_name,
            role,
            language: request
                .language
                .filter(|language| !language.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            is_verified: false,
            verification_code: Some(code.clone()),
            verification_code_expires_at: Some(
                self.expiry(self.config.verification_code_ttl_seconds()),
            ),
            verified_at: None,
            is_active: false,
            deactivated_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            last_login_at: None,
            created_at: Utc::now(),
        };

        // The directory is the last word on uniqueness.
        if self
            .store("insert", self.collaborators.users.insert(&identity))
            .await?
            == InsertOutcome::Conflict
        {
            return Err(AuthError::Conflict);
        }

        let tokens = self.issuer.issue(&identity).await?;

        let gateway = self.collaborators.notifications.clone();
        let welcomed = identity.clone();
        dispatch("welcome", identity.id, async move {
            gateway.send_welcome(&welcomed).await
        });
        let channel = if identity.email.is_some() {
            Channel::Email
        } else {
            Channel::Sms
        };
        self.send_code(&identity, channel, code);

        self.audit(AuditRecord::by_self(
            identity.id,
            AuditEvent::Registered { role },
        ))
        .await;
        info!(user_id = %identity.id, %role, "account registered");

        Ok(RegistrationOutcome {
            tokens,
            user: identity.profile(),
            verification_required: true,
        })
    }

    /// Consume a verification code.
    ///
    /// A self-registered account becomes active on its first successful
    /// verification unless staff have deactivated it in the meantime.
    ///
    /// # Errors
    /// [`AuthError::CodeExpired`] when the code matched but has expired,
    /// [`AuthError::NotFound`] when it never matched.
    #[instrument(skip_all)]
    pub async fn verify_account(&self, code: &str) -> Result<UserProfile, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::validation("verification code is required"));
        }

        let holder = self
            .store(
                "find_by_verification_code",
                self.collaborators.users.find_by_verification_code(code),
            )
            .await?
            .ok_or(AuthError::NotFound("invalid verification code"))?;

        let now = Utc::now();
        if holder
            .verification_code_expires_at
            .map_or(true, |expires_at| expires_at <= now)
        {
            return Err(AuthError::CodeExpired);
        }

        // Another request may have consumed the code since the lookup.
        let identity = self
            .store(
                "consume_verification_code",
                self.collaborators.users.consume_verification_code(
                    holder.id,
                    code,
                    now,
                    !holder.role.is_staff(),
                ),
            )
            .await?
            .ok_or(AuthError::NotFound("invalid verification code"))?;

        self.audit(AuditRecord::by_self(identity.id, AuditEvent::AccountVerified))
            .await;
        info!(user_id = %identity.id, "account verified");

        Ok(identity.profile())
    }

    /// Issue a fresh code, replacing any earlier one, and send it by SMS.
    ///
    /// # Errors
    /// [`AuthError::NotFound`] for an unknown phone and
    /// [`AuthError::Validation`] for an account that is already verified.
    #[instrument(skip_all)]
    pub async fn resend_verification_code(&self, phone: &str) -> Result<(), AuthError> {
        let phone = self.phone(phone)?;
        let identity = self
            .store(
                "find_by_phone",
                self.collaborators.users.find_by_phone(&phone),
            )
            .await?
            .ok_or(AuthError::NotFound("no account with this phone number"))?;

        if identity.is_verified {
            return Err(AuthError::validation("account is already verified"));
        }

        let code = self.fresh_code().await?;
        let expires_at = self.expiry(self.config.verification_code_ttl_seconds());
        if !self
            .store(
                "set_verification_code",
                self.collaborators
                    .users
                    .set_verification_code(identity.id, &code, expires_at),
            )
            .await?
        {
            return Err(AuthError::validation("account is already verified"));
        }

        self.send_code(&identity, Channel::Sms, code);
        self.audit(AuditRecord::by_self(
            identity.id,
            AuditEvent::VerificationCodeResent,
        ))
        .await;

        Ok(())
    }

    /// Start a password reset.
    ///
    /// The answer is [`FORGOT_PASSWORD_MESSAGE`] whether or not an account
    /// matched, and failures after a match are only logged.
    ///
    /// # Errors
    /// [`AuthError::Validation`] when neither identifier is supplied and
    /// [`AuthError::Unavailable`] when the lookups themselves fail.
    #[instrument(skip_all)]
    pub async fn forgot_password(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<&'static str, AuthError> {
        let email = email
            .map(normalize_email)
            .filter(|email| !email.is_empty());
        let phone = phone
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .map(|phone| {
                normalize_phone(phone, self.config.default_country_code())
                    .unwrap_or_else(|| phone.to_string())
            });
        if email.is_none() && phone.is_none() {
            return Err(AuthError::validation("email or phone is required"));
        }

        let mut found = None;
        if let Some(email) = &email {
            found = self
                .store("find_by_email", self.collaborators.users.find_by_email(email))
                .await?;
        }
        if found.is_none() {
            if let Some(phone) = &phone {
                found = self
                    .store("find_by_phone", self.collaborators.users.find_by_phone(phone))
                    .await?;
            }
        }

        if let Some(identity) = found {
            if let Err(err) = self.start_reset(identity).await {
                warn!("password reset could not be started: {err}");
            }
        }

        Ok(FORGOT_PASSWORD_MESSAGE)
    }

    async fn start_reset(&self, identity: Identity) -> Result<(), AuthError> {
        let token = generate_reset_token().map_err(|err| {
            warn!(user_id = %identity.id, "{err:#}");
            AuthError::Unavailable
        })?;
        let expires_at = self.expiry(self.config.reset_token_ttl_seconds());
        if !self
            .store(
                "set_reset_token",
                self.collaborators
                    .users
                    .set_reset_token(identity.id, &token, expires_at),
            )
            .await?
        {
            return Err(AuthError::NotFound("user not found"));
        }

        // Every channel on file, not either/or.
        for channel in [Channel::Email, Channel::Sms] {
            if channel.address(&identity).is_none() {
                continue;
            }
            let gateway = self.collaborators.notifications.clone();
            let recipient = identity.clone();
            let token = token.clone();
            dispatch("password_reset", identity.id, async move {
                gateway
                    .send_password_reset(&recipient, channel, &token)
                    .await
            });
        }

        self.audit(AuditRecord::new(
            None,
            identity.id,
            AuditEvent::PasswordResetRequested,
        ))
        .await;
        Ok(())
    }

    /// Complete a password reset and end every session of the account.
    ///
    /// # Errors
    /// [`AuthError::Validation`] for mismatched or weak passwords (checked
    /// before any lookup) and [`AuthError::TokenInvalid`] for an unknown or
    /// expired token.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::validation("passwords do not match"));
        }
        if !valid_password(new_password) {
            return Err(AuthError::validation(
                "password must be between 8 and 128 characters",
            ));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }
        let identity = self
            .store(
                "find_by_reset_token",
                self.collaborators.users.find_by_reset_token(token),
            )
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if identity
            .reset_token_expires_at
            .map_or(true, |expires_at| expires_at <= Utc::now())
        {
            return Err(AuthError::TokenInvalid);
        }

        let password_hash = hash(new_password.to_string()).await?;
        if !self
            .store(
                "replace_password",
                self.collaborators
                    .users
                    .replace_password(identity.id, token, &password_hash),
            )
            .await?
        {
            return Err(AuthError::TokenInvalid);
        }

        let revocations = &self.collaborators.revocations;
        let revoked = revocation_write(
            self.config.store_timeout(),
            self.config.store_write_attempts(),
            "revoke_all",
            identity.id,
            || revocations.revoke_all_user_tokens(identity.id),
        )
        .await;

        self.audit(AuditRecord::new(None, identity.id, AuditEvent::PasswordReset))
            .await;
        info!(user_id = %identity.id, revoked_sessions = revoked.unwrap_or(0), "password reset");

        Ok(())
    }

    /// Flip the administrative activation switch of `user_id`.
    ///
    /// Deactivation also revokes every indexed session, best effort: the flag
    /// itself is what the guard enforces.
    ///
    /// # Errors
    /// [`AuthError::Forbidden`] unless `actor` is staff and
    /// [`AuthError::NotFound`] for an unknown user.
    #[instrument(skip_all, fields(actor_id = %actor.id, user_id = %user_id, active = active))]
    pub async fn set_activation(
        &self,
        actor: &Identity,
        user_id: Uuid,
        active: bool,
    ) -> Result<UserProfile, AuthError> {
        if !actor.role.is_staff() {
            return Err(AuthError::Forbidden("staff access required"));
        }

        let mut identity = self
            .store("find_by_id", self.collaborators.users.find_by_id(user_id))
            .await?
            .ok_or(AuthError::NotFound("user not found"))?;
        let before = identity.is_active;

        if !self
            .store(
                "update_activation",
                self.collaborators.users.update_activation(user_id, active),
            )
            .await?
        {
            return Err(AuthError::NotFound("user not found"));
        }
        identity.is_active = active;

        if !active {
            let revocations = &self.collaborators.revocations;
            match bounded(
                self.config.store_timeout(),
                "revoke_all",
                revocations.revoke_all_user_tokens(user_id),
            )
            .await
            {
                Ok(revoked) => info!(revoked_sessions = revoked, "sessions revoked on deactivation"),
                Err(_) => warn!("session cleanup after deactivation failed; guard still rejects the account"),
            }
        }

        self.audit(AuditRecord::new(
            Some(actor.id),
            user_id,
            AuditEvent::ActivationChanged {
                before,
                after: active,
            },
        ))
        .await;

        Ok(identity.profile())
    }
}

async fn hash(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)
        .and_then(|hashed| hashed)
        .map_err(|err| {
            warn!("password hashing failed: {err:#}");
            AuthError::Unavailable
        })
}
