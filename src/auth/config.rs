//! Auth configuration.

use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_VERIFICATION_CODE_LENGTH: usize = 6;
const DEFAULT_COUNTRY_CODE: &str = "250";
const DEFAULT_ISSUER: &str = "tessera";
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_STORE_WRITE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    verification_code_ttl_seconds: i64,
    verification_code_length: usize,
    reset_token_ttl_seconds: i64,
    default_country_code: String,
    store_timeout: Duration,
    store_write_attempts: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            verification_code_ttl_seconds: DEFAULT_VERIFICATION_CODE_TTL_SECONDS,
            verification_code_length: DEFAULT_VERIFICATION_CODE_LENGTH,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            store_write_attempts: DEFAULT_STORE_WRITE_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_code_length(mut self, length: usize) -> Self {
        self.verification_code_length = length;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_default_country_code(mut self, code: String) -> Self {
        self.default_country_code = code.trim_start_matches('+').to_string();
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_store_write_attempts(mut self, attempts: u32) -> Self {
        self.store_write_attempts = attempts;
        self
    }

    /// Reject configurations that would make tokens interchangeable or
    /// instantly expired.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let access = self.access_secret.expose_secret();
        let refresh = self.refresh_secret.expose_secret();
        if access.is_empty() || refresh.is_empty() {
            bail!("access and refresh secrets must not be empty");
        }
        if access == refresh {
            bail!("access and refresh secrets must differ");
        }
        if self.access_ttl_seconds <= 0 || self.refresh_ttl_seconds <= 0 {
            bail!("token TTLs must be positive");
        }
        if self.verification_code_ttl_seconds <= 0 || self.reset_token_ttl_seconds <= 0 {
            bail!("one-time code TTLs must be positive");
        }
        if !(4..=10).contains(&self.verification_code_length) {
            bail!("verification code length must be between 4 and 10 digits");
        }
        if self.default_country_code.is_empty()
            || !self.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            bail!("default country code must be numeric");
        }
        Ok(())
    }

    pub(crate) fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    pub(crate) fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn verification_code_ttl_seconds(&self) -> i64 {
        self.verification_code_ttl_seconds
    }

    #[must_use]
    pub fn verification_code_length(&self) -> usize {
        self.verification_code_length
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn default_country_code(&self) -> &str {
        &self.default_country_code
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn store_write_attempts(&self) -> u32 {
        self.store_write_attempts.max(1)
    }
}
