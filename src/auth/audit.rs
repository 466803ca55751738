//! Audit events emitted by the session and account flows.
//!
//! Each action has its own variant carrying only the fields relevant to it, so
//! the sink's schema is known at compile time. Passwords, codes and tokens are
//! never part of an event.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use super::identity::Role;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSucceeded {
        device_id: Option<String>,
        at: DateTime<Utc>,
    },
    TokenRefreshed,
    LoggedOut {
        revoked_sessions: u64,
    },
    Registered {
        role: Role,
    },
    AccountVerified,
    VerificationCodeResent,
    PasswordResetRequested,
    PasswordReset,
    ActivationChanged {
        before: bool,
        after: bool,
    },
}

impl AuditEvent {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::TokenRefreshed => "token_refreshed",
            Self::LoggedOut { .. } => "logged_out",
            Self::Registered { .. } => "registered",
            Self::AccountVerified => "account_verified",
            Self::VerificationCodeResent => "verification_code_resent",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordReset => "password_reset",
            Self::ActivationChanged { .. } => "activation_changed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// Who acted; `None` for unauthenticated flows such as password reset.
    pub actor_id: Option<Uuid>,
    pub entity_id: Uuid,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    #[must_use]
    pub fn new(actor_id: Option<Uuid>, entity_id: Uuid, event: AuditEvent) -> Self {
        Self {
            actor_id,
            entity_id,
            event,
        }
    }

    /// Record where the user acts on their own account.
    #[must_use]
    pub fn by_self(user_id: Uuid, event: AuditEvent) -> Self {
        Self::new(Some(user_id), user_id, event)
    }

    #[must_use]
    pub fn action(&self) -> &'static str {
        self.event.action()
    }

    #[must_use]
    pub fn entity_type(&self) -> &'static str {
        "user"
    }

    #[must_use]
    pub fn description(&self) -> String {
        match &self.event {
            AuditEvent::LoginSucceeded { device_id, .. } => format!(
                "login succeeded from device {}",
                device_id.as_deref().unwrap_or("unknown")
            ),
            AuditEvent::TokenRefreshed => "session tokens rotated".to_string(),
            AuditEvent::LoggedOut { revoked_sessions } => {
                format!("logged out, {revoked_sessions} session(s) revoked")
            }
            AuditEvent::Registered { role } => format!("registered as {role}"),
            AuditEvent::AccountVerified => "account verified".to_string(),
            AuditEvent::VerificationCodeResent => "verification code resent".to_string(),
            AuditEvent::PasswordResetRequested => "password reset requested".to_string(),
            AuditEvent::PasswordReset => "password reset, all sessions revoked".to_string(),
            AuditEvent::ActivationChanged { before, after } => {
                format!("activation changed from {before} to {after}")
            }
        }
    }
}

/// Append-only audit destination.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

/// Emits audit records as structured `info` events on the `audit` target.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let payload = serde_json::to_string(&record)?;
        info!(
            target: "audit",
            action = record.action(),
            entity_type = record.entity_type(),
            entity_id = %record.entity_id,
            payload = %payload,
            "{}",
            record.description()
        );
        Ok(())
    }
}

/// Record `record` without letting a slow or failing sink affect the caller.
pub(crate) async fn emit(sink: &dyn AuditSink, deadline: Duration, record: AuditRecord) {
    let action = record.action();
    match timeout(deadline, sink.record(record)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(action, "audit record dropped: {err:#}"),
        Err(_) => warn!(action, ?deadline, "audit record dropped: sink timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_action_tag() -> Result<()> {
        let user = Uuid::new_v4();
        let record = AuditRecord::by_self(
            user,
            AuditEvent::LoginSucceeded {
                device_id: Some("pixel-7".to_string()),
                at: Utc::now(),
            },
        );
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["action"], "login_succeeded");
        assert_eq!(value["device_id"], "pixel-7");
        assert_eq!(value["entity_id"], user.to_string());
        assert_eq!(record.entity_type(), "user");
        Ok(())
    }

    #[test]
    fn descriptions_are_specific() {
        let user = Uuid::new_v4();
        let record = AuditRecord::new(
            None,
            user,
            AuditEvent::ActivationChanged {
                before: true,
                after: false,
            },
        );
        assert_eq!(record.description(), "activation changed from true to false");
        assert_eq!(record.action(), "activation_changed");
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _record: AuditRecord) -> Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    #[tokio::test]
    async fn emit_swallows_sink_failures() {
        emit(
            &FailingSink,
            Duration::from_millis(50),
            AuditRecord::by_self(Uuid::new_v4(), AuditEvent::PasswordReset),
        )
        .await;
    }

    #[tokio::test]
    async fn tracing_sink_accepts_records() -> Result<()> {
        TracingAuditSink
            .record(AuditRecord::by_self(Uuid::new_v4(), AuditEvent::TokenRefreshed))
            .await
    }
}
