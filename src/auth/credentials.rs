//! Password hashing and credential validation.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

use super::{bounded::bounded, directory::UserDirectory, error::AuthError, identity::Identity};

/// Which field the client supplied as its login identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email(String),
    Phone(String),
}

/// Hash a password with Argon2id and a random salt (PHC string format).
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Constant-time check of `password` against a PHC hash string.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

pub struct CredentialValidator {
    users: Arc<dyn UserDirectory>,
    lookup_timeout: Duration,
    // Verified against on unknown identifiers so both misses cost the same.
    decoy_hash: String,
}

impl CredentialValidator {
    /// # Errors
    /// Returns an error if the decoy hash cannot be computed.
    pub fn new(users: Arc<dyn UserDirectory>, lookup_timeout: Duration) -> Result<Self> {
        Ok(Self {
            users,
            lookup_timeout,
            decoy_hash: hash_password("decoy password for unknown identifiers")?,
        })
    }

    /// Look the identity up by the supplied field and verify the password.
    ///
    /// Returns `Ok(None)` for both an unknown identifier and a wrong password.
    ///
    /// # Errors
    /// Returns [`AuthError::Unavailable`] when the directory lookup fails or
    /// times out.
    pub async fn validate(
        &self,
        identifier: &LoginIdentifier,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let identity = match identifier {
            LoginIdentifier::Email(email) => {
                bounded(self.lookup_timeout, "find_by_email", self.users.find_by_email(email)).await?
            }
            LoginIdentifier::Phone(phone) => {
                bounded(self.lookup_timeout, "find_by_phone", self.users.find_by_phone(phone)).await?
            }
        };

        let hash = identity
            .as_ref()
            .map_or_else(|| self.decoy_hash.clone(), |found| found.password_hash.clone());
        let matches = check_password(password.to_string(), hash).await?;

        match identity {
            Some(identity) if matches => Ok(Some(identity)),
            Some(identity) => {
                debug!(user_id = %identity.id, "password mismatch");
                Ok(None)
            }
            None => {
                debug!("unknown login identifier");
                Ok(None)
            }
        }
    }
}

/// Argon2 is CPU bound; keep it off the async workers.
async fn check_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| {
            error!("password verification task failed: {err}");
            AuthError::Unavailable
        })
}
