//! Credential and session lifecycle engine.
//!
//! The engine is transport independent. It depends only on narrow collaborator
//! traits ([`UserDirectory`], [`StaffProfileDirectory`], [`RevocationStore`],
//! [`NotificationGateway`], [`AuditSink`]) that are constructed once at startup
//! and passed in, so the HTTP layer, the Postgres adapters and the tests all
//! wire the same core.
//!
//! Components, leaves first:
//!
//! - [`revocation`]: blacklist and per-user token index with per-key TTL.
//! - [`credentials`]: identifier + password verification.
//! - [`token`]: access/refresh pair minting and verification.
//! - [`session`]: login, refresh, logout and the per-request guard.
//! - [`lifecycle`]: registration, verification codes, password reset and
//!   administrative activation.

pub mod audit;
mod bounded;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod revocation;
pub mod session;
pub mod token;
pub mod utils;

pub use audit::{AuditEvent, AuditRecord, AuditSink, TracingAuditSink};
pub use config::AuthConfig;
pub use credentials::{CredentialValidator, LoginIdentifier};
pub use directory::{
    InsertOutcome, MemoryStaffProfiles, MemoryUserDirectory, StaffProfileDirectory, UserDirectory,
};
pub use error::AuthError;
pub use identity::{Identity, Role, UserProfile};
pub use lifecycle::{
    AccountLifecycleManager, RegistrationOutcome, RegistrationRequest, FORGOT_PASSWORD_MESSAGE,
};
pub use notify::{Channel, HttpNotificationGateway, LogNotificationGateway, NotificationGateway};
pub use revocation::{MemoryRevocationStore, RevocationStore};
pub use session::{LoginOutcome, LoginRequest, SessionOrchestrator};
pub use token::{TokenClaims, TokenIssuer, TokenPair};

use std::sync::Arc;

/// Collaborators shared by the session orchestrator and the lifecycle manager.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub staff_profiles: Arc<dyn StaffProfileDirectory>,
    pub revocations: Arc<dyn RevocationStore>,
    pub notifications: Arc<dyn NotificationGateway>,
    pub audit: Arc<dyn AuditSink>,
}

/// Fully wired engine: both entry points share one token issuer and one set
/// of collaborators.
pub struct AuthService {
    sessions: SessionOrchestrator,
    accounts: AccountLifecycleManager,
}

impl AuthService {
    /// Wire the engine.
    ///
    /// # Errors
    /// Returns an error if the signing secrets are unusable or the credential
    /// validator cannot be initialized.
    pub fn new(config: AuthConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let issuer = Arc::new(TokenIssuer::new(
            config.clone(),
            collaborators.revocations.clone(),
        )?);
        let validator = Arc::new(CredentialValidator::new(
            collaborators.users.clone(),
            config.store_timeout(),
        )?);

        let sessions = SessionOrchestrator::new(
            config.clone(),
            validator,
            issuer.clone(),
            collaborators.clone(),
        );
        let accounts = AccountLifecycleManager::new(config, issuer, collaborators);

        Ok(Self { sessions, accounts })
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionOrchestrator {
        &self.sessions
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountLifecycleManager {
        &self.accounts
    }
}
