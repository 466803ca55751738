//! Access/refresh token minting and verification.
//!
//! Both tokens are HS256 JWTs over the same claim set, signed with independent
//! secrets and carrying independent TTLs, so a refresh token never verifies as
//! an access token and vice versa. Every token carries a random `jti`, which
//! keeps two pairs minted in the same second distinct.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    bounded::bounded_retry,
    config::AuthConfig,
    error::AuthError,
    identity::{Identity, Role},
    revocation::RevocationStore,
};

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenClaims {
    /// Seconds until expiry, never negative.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        let seconds = self.exp.saturating_sub(Utc::now().timestamp());
        Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl SigningKeys {
    fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }
}

pub struct TokenIssuer {
    config: Arc<AuthConfig>,
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenIssuer {
    /// # Errors
    /// Returns an error if the configuration is invalid (empty or shared secrets).
    pub fn new(config: Arc<AuthConfig>, revocations: Arc<dyn RevocationStore>) -> Result<Self> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        Ok(Self {
            access: SigningKeys::new(
                config.access_secret().expose_secret().as_bytes(),
                config.access_ttl_seconds(),
            ),
            refresh: SigningKeys::new(
                config.refresh_secret().expose_secret().as_bytes(),
                config.refresh_ttl_seconds(),
            ),
            config,
            validation,
            revocations,
        })
    }

    fn claims(&self, identity: &Identity, ttl_seconds: i64) -> TokenClaims {
        let now = Utc::now().timestamp();
        TokenClaims {
            sub: identity.id,
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            role: identity.role,
            is_verified: identity.is_verified,
            iss: self.config.issuer().to_string(),
            iat: now,
            exp: now + ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn sign(&self, identity: &Identity, keys: &SigningKeys) -> Result<String> {
        let claims = self.claims(identity, keys.ttl_seconds);
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .context("failed to sign token")
    }

    /// Mint a new pair and register the refresh token in the user's index.
    ///
    /// Never revokes anything: rotating callers blacklist the previous refresh
    /// token themselves.
    ///
    /// # Errors
    /// Returns [`AuthError::Unavailable`] if signing fails or the index write
    /// still fails after the configured retries.
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let signed = self
            .sign(identity, &self.access)
            .and_then(|access| Ok((access, self.sign(identity, &self.refresh)?)));
        let (access_token, refresh_token) = signed.map_err(|err| {
            error!(user_id = %identity.id, "token signing failed: {err:#}");
            AuthError::Unavailable
        })?;

        let ttl = self.refresh_ttl();
        bounded_retry(
            self.config.store_timeout(),
            self.config.store_write_attempts(),
            "index_user_token",
            || {
                self.revocations
                    .index_user_token(identity.id, &refresh_token, ttl)
            },
        )
        .await
        .map_err(|err| {
            error!(user_id = %identity.id, "failed to index refresh token: {err:#}");
            AuthError::Unavailable
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access.ttl_seconds,
            token_type: TOKEN_TYPE.to_string(),
        })
    }

    /// Verify signature, issuer and expiry of an access token.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] on any failure.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, &self.access, "access")
    }

    /// Verify signature, issuer and expiry of a refresh token.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] on any failure.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, &self.refresh, "refresh")
    }

    fn verify(
        &self,
        token: &str,
        keys: &SigningKeys,
        kind: &'static str,
    ) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                // Cause stays in the logs; callers only ever see one error.
                debug!(kind, "token rejected: {err}");
                AuthError::TokenInvalid
            })
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.access.ttl_seconds).unwrap_or(0))
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.refresh.ttl_seconds).unwrap_or(0))
    }
}
