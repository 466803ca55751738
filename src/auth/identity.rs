//! Identity records shared by donors, beneficiaries and staff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Donor,
    Beneficiary,
    StaffAdmin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Beneficiary => "beneficiary",
            Self::StaffAdmin => "staff_admin",
        }
    }

    #[must_use]
    pub fn is_staff(self) -> bool {
        matches!(self, Self::StaffAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "donor" => Ok(Self::Donor),
            "beneficiary" => Ok(Self::Beneficiary),
            "staff_admin" | "staff-admin" | "admin" => Ok(Self::StaffAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identity as stored by the user directory.
///
/// One of `email`/`phone` is always present and both are usable as the login
/// identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub language: String,
    pub is_verified: bool,
    pub verification_code: Option<String>,
    pub verification_code_expires_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Set when staff deactivate the account; verification then leaves it
    /// inactive.
    pub deactivated_at: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// A session may only be issued to an active account; non-staff accounts
    /// must also be verified.
    #[must_use]
    pub fn can_hold_session(&self) -> bool {
        self.is_active && (self.is_verified || self.role.is_staff())
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Identity with secrets stripped, safe to return to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: String,
    pub role: Role,
    pub language: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role,
            language: identity.language.clone(),
            is_verified: identity.is_verified,
            is_active: identity.is_active,
            last_login_at: identity.last_login_at,
            created_at: identity.created_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_identity::donor;
    use super::*;

    #[test]
    fn role_parses_aliases() {
        assert_eq!("donor".parse::<Role>(), Ok(Role::Donor));
        assert_eq!("Staff-Admin".parse::<Role>(), Ok(Role::StaffAdmin));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::Beneficiary.to_string(), "beneficiary");
    }

    #[test]
    fn session_gate_requires_active_and_verified_unless_staff() {
        let mut identity = donor("hash");
        assert!(identity.can_hold_session());

        identity.is_verified = false;
        assert!(!identity.can_hold_session());

        identity.role = Role::StaffAdmin;
        assert!(identity.can_hold_session());

        identity.is_active = false;
        assert!(!identity.can_hold_session());
    }

    #[test]
    fn profile_strips_secrets() -> anyhow::Result<()> {
        let mut identity = donor("argon-hash");
        identity.reset_token = Some("reset".to_string());
        let value = serde_json::to_value(identity.profile())?;
        let text = value.to_string();
        assert!(!text.contains("argon-hash"));
        assert!(!text.contains("reset"));
        assert_eq!(value["role"], "donor");
        Ok(())
    }
}
