//! Narrow interfaces onto identity persistence.
//!
//! The engine never reaches into storage directly; it only sees these traits.
//! The Postgres adapters live in [`crate::storage`]; the in-memory versions here
//! back tests and local development.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::identity::Identity;

/// Outcome when attempting to create a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    Conflict,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>>;

    /// Match on email OR phone; used for the joint uniqueness check.
    async fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Identity>>;

    /// Holder of `code`, preferring one whose code has not expired yet.
    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Identity>>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>>;

    /// Insert a new identity; uniqueness across email and phone is enforced here.
    async fn insert(&self, identity: &Identity) -> Result<InsertOutcome>;

    // Writes below touch only their own columns, so a flow working from a
    // stale read cannot undo a concurrent deactivation or password change.

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Replace the verification code of a still unverified identity. Returns
    /// `false` when it is missing or already verified.
    async fn set_verification_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Mark the identity verified if it still holds `code`, clearing the code.
    ///
    /// With `activate` the account also becomes active, unless staff
    /// deactivated it. Returns `None` when the code was already consumed.
    async fn consume_verification_code(
        &self,
        id: Uuid,
        code: &str,
        at: DateTime<Utc>,
        activate: bool,
    ) -> Result<Option<Identity>>;

    /// Returns `false` when the identity does not exist.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Swap the password hash if the identity still holds `token`, clearing
    /// the token. Returns `false` when the token was already used.
    async fn replace_password(&self, id: Uuid, token: &str, password_hash: &str)
        -> Result<bool>;

    /// Flip the administrative activation switch. Deactivation stamps
    /// `deactivated_at`, activation clears it. Returns `false` when the
    /// identity does not exist.
    async fn update_activation(&self, id: Uuid, active: bool) -> Result<bool>;
}

#[async_trait]
pub trait StaffProfileDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_where<F>(&self, predicate: F) -> Option<Identity>
    where
        F: Fn(&Identity) -> bool + Send,
    {
        self.users
            .read()
            .await
            .values()
            .find(|identity| predicate(identity))
            .cloned()
    }

    async fn update<F>(&self, id: Uuid, edit: F) -> bool
    where
        F: FnOnce(&mut Identity) + Send,
    {
        self.users.write().await.get_mut(&id).map(edit).is_some()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        Ok(self
            .find_where(|identity| identity.email.as_deref() == Some(email))
            .await)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>> {
        Ok(self
            .find_where(|identity| identity.phone.as_deref() == Some(phone))
            .await)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Identity>> {
        Ok(self
            .find_where(|identity| {
                (email.is_some() && identity.email.as_deref() == email)
                    || (phone.is_some() && identity.phone.as_deref() == phone)
            })
            .await)
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Identity>> {
        let now = Utc::now();
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|identity| identity.verification_code.as_deref() == Some(code))
            .max_by_key(|identity| {
                let expires_at = identity.verification_code_expires_at;
                (expires_at.is_some_and(|at| at > now), expires_at)
            })
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>> {
        Ok(self
            .find_where(|identity| identity.reset_token.as_deref() == Some(token))
            .await)
    }

    async fn insert(&self, identity: &Identity) -> Result<InsertOutcome> {
        let mut users = self.users.write().await;
        let taken = users.values().any(|existing| {
            (identity.email.is_some() && existing.email == identity.email)
                || (identity.phone.is_some() && existing.phone == identity.phone)
        });
        if taken || users.contains_key(&identity.id) {
            return Ok(InsertOutcome::Conflict);
        }
        users.insert(identity.id, identity.clone());
        Ok(InsertOutcome::Created)
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.update(id, |identity| identity.last_login_at = Some(at))
            .await
            .then_some(())
            .ok_or_else(|| anyhow!("identity {id} not found"))
    }

    async fn set_verification_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(identity) if !identity.is_verified => {
                identity.verification_code = Some(code.to_string());
                identity.verification_code_expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_verification_code(
        &self,
        id: Uuid,
        code: &str,
        at: DateTime<Utc>,
        activate: bool,
    ) -> Result<Option<Identity>> {
        let mut users = self.users.write().await;
        let Some(identity) = users
            .get_mut(&id)
            .filter(|identity| identity.verification_code.as_deref() == Some(code))
        else {
            return Ok(None);
        };
        identity.is_verified = true;
        identity.verified_at = Some(at);
        identity.verification_code = None;
        identity.verification_code_expires_at = None;
        if activate && identity.deactivated_at.is_none() {
            identity.is_active = true;
        }
        Ok(Some(identity.clone()))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .update(id, |identity| {
                identity.reset_token = Some(token.to_string());
                identity.reset_token_expires_at = Some(expires_at);
            })
            .await)
    }

    async fn replace_password(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(identity) if identity.reset_token.as_deref() == Some(token) => {
                identity.password_hash = password_hash.to_string();
                identity.reset_token = None;
                identity.reset_token_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_activation(&self, id: Uuid, active: bool) -> Result<bool> {
        Ok(self
            .update(id, |identity| {
                identity.is_active = active;
                identity.deactivated_at = if active { None } else { Some(Utc::now()) };
            })
            .await)
    }
}

#[derive(Default)]
pub struct MemoryStaffProfiles {
    profiles: RwLock<HashSet<Uuid>>,
}

impl MemoryStaffProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: Uuid) {
        self.profiles.write().await.insert(user_id);
    }
}

#[async_trait]
impl StaffProfileDirectory for MemoryStaffProfiles {
    async fn exists(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.profiles.read().await.contains(&user_id))
    }
}


#[cfg(test)]
mod tests {
    use super::super::identity::test_identity::donor;
    use super::*;

    #[tokio::test]
    async fn insert_enforces_joint_uniqueness() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let first = donor("hash");
        assert_eq!(directory.insert(&first).await?, InsertOutcome::Created);

        let mut same_phone = donor("hash");
        same_phone.email = Some("other@example.org".to_string());
        assert_eq!(directory.insert(&same_phone).await?, InsertOutcome::Conflict);

        let mut same_email = donor("hash");
        same_email.phone = Some("+250788999999".to_string());
        assert_eq!(directory.insert(&same_email).await?, InsertOutcome::Conflict);
        Ok(())
    }

    #[tokio::test]
    async fn lookups_match_exact_fields() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let mut identity = donor("hash");
        identity.verification_code = Some("123456".to_string());
        directory.insert(&identity).await?;

        assert!(directory.find_by_email("donor@example.org").await?.is_some());
        assert!(directory.find_by_phone("+250788000111").await?.is_some());
        assert!(directory.find_by_phone("+250788000112").await?.is_none());
        assert!(directory.find_by_verification_code("123456").await?.is_some());
        assert!(directory.find_by_reset_token("123456").await?.is_none());
        assert!(directory
            .find_by_email_or_phone(None, Some("+250788000111"))
            .await?
            .is_some());
        assert!(directory.find_by_email_or_phone(None, None).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_activation_reports_missing_identity() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let identity = donor("hash");
        directory.insert(&identity).await?;

        assert!(directory.update_activation(identity.id, false).await?);
        assert!(!directory.update_activation(Uuid::new_v4(), false).await?);
        let stored = directory.find_by_id(identity.id).await?;
        assert_eq!(stored.map(|i| i.is_active), Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn verification_code_lookup_prefers_live_holder() -> Result<()> {
        // Iteration order varies between maps, so repeat with fresh ones.
        for _ in 0..20 {
            let directory = MemoryUserDirectory::new();
            let mut stale = donor("hash");
            stale.is_verified = false;
            stale.verification_code = Some("123456".to_string());
            stale.verification_code_expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
            let mut live = stale.clone();
            live.id = Uuid::new_v4();
            live.email = Some("live@example.org".to_string());
            live.phone = Some("+250788000222".to_string());
            live.verification_code_expires_at = Some(Utc::now() + chrono::Duration::minutes(5));
            directory.insert(&stale).await?;
            directory.insert(&live).await?;

            let found = directory.find_by_verification_code("123456").await?;
            assert_eq!(found.map(|identity| identity.id), Some(live.id));
        }
        Ok(())
    }

    #[tokio::test]
    async fn targeted_writes_leave_other_columns_alone() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let identity = donor("original-hash");
        directory.insert(&identity).await?;
        directory.update_activation(identity.id, false).await?;

        let now = Utc::now();
        directory.touch_last_login(identity.id, now).await?;
        assert!(directory.set_reset_token(identity.id, "reset", now).await?);

        let stored = directory
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| anyhow!("identity missing"))?;
        assert!(!stored.is_active);
        assert!(stored.deactivated_at.is_some());
        assert_eq!(stored.password_hash, "original-hash");
        assert_eq!(stored.last_login_at, Some(now));
        assert!(directory.touch_last_login(Uuid::new_v4(), now).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn replace_password_consumes_the_token_once() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let identity = donor("old-hash");
        directory.insert(&identity).await?;
        directory
            .set_reset_token(identity.id, "reset", Utc::now())
            .await?;

        assert!(!directory.replace_password(identity.id, "other", "new-hash").await?);
        assert!(directory.replace_password(identity.id, "reset", "new-hash").await?);
        assert!(!directory.replace_password(identity.id, "reset", "newer-hash").await?);

        let stored = directory.find_by_id(identity.id).await?;
        assert_eq!(stored.map(|i| i.password_hash), Some("new-hash".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn consuming_a_code_respects_staff_deactivation() -> Result<()> {
        let directory = MemoryUserDirectory::new();
        let mut identity = donor("hash");
        identity.is_verified = false;
        identity.is_active = false;
        directory.insert(&identity).await?;
        let expires_at = Utc::now() + chrono::Duration::minutes(5);

        assert!(directory.set_verification_code(identity.id, "111111", expires_at).await?);
        directory.update_activation(identity.id, false).await?;
        let verified = directory
            .consume_verification_code(identity.id, "111111", Utc::now(), true)
            .await?
            .ok_or_else(|| anyhow!("code should be consumed"))?;
        assert!(verified.is_verified);
        assert!(!verified.is_active);

        assert!(directory
            .consume_verification_code(identity.id, "111111", Utc::now(), true)
            .await?
            .is_none());
        assert!(!directory.set_verification_code(identity.id, "222222", expires_at).await?);
        Ok(())
    }

    #[tokio::test]
    async fn staff_profiles_exist_after_insert() -> Result<()> {
        let profiles = MemoryStaffProfiles::new();
        let id = Uuid::new_v4();
        assert!(!profiles.exists(id).await?);
        profiles.insert(id).await;
        assert!(profiles.exists(id).await?);
        Ok(())
    }
}
