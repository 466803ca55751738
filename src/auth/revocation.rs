//! Token revocation store.
//!
//! Two kinds of entries, both expiring on their own:
//!
//! - `blacklist:{fingerprint}`: the token must be rejected until it would have
//!   expired anyway. Callers pass the token's *remaining* lifetime as TTL so the
//!   store only ever holds "still valid but revoked" tokens.
//! - `user_tokens:{user_id}:{fingerprint}`: the refresh token is a live session
//!   token of that user. Deleting every entry under the user prefix is
//!   "log out everywhere".
//!
//! Tokens are fingerprinted with SHA-256 before they become keys; listings return
//! fingerprints, never bearer values.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::utils::token_fingerprint;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Denylist `token` for `ttl`. Idempotent.
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Denylist `token` only if it is not already denylisted.
    ///
    /// Returns `true` when this call created the entry. Refresh rotation uses
    /// it as an atomic claim on the presented token.
    async fn blacklist_if_absent(&self, token: &str, ttl: Duration) -> Result<bool>;

    async fn is_blacklisted(&self, token: &str) -> Result<bool>;

    async fn index_user_token(&self, user_id: Uuid, token: &str, ttl: Duration) -> Result<()>;

    async fn is_user_token_live(&self, user_id: Uuid, token: &str) -> Result<bool>;

    async fn remove_user_token(&self, user_id: Uuid, token: &str) -> Result<()>;

    /// Delete every indexed token of `user_id`; returns how many were live.
    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<u64>;

    /// Fingerprints of the user's live indexed tokens.
    async fn list_user_tokens(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// Drop expired entries; returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

pub(crate) fn blacklist_key(token: &str) -> String {
    format!("blacklist:{}", token_fingerprint(token))
}

pub(crate) fn user_prefix(user_id: Uuid) -> String {
    format!("user_tokens:{user_id}:")
}

pub(crate) fn user_token_key(user_id: Uuid, token: &str) -> String {
    format!("{}{}", user_prefix(user_id), token_fingerprint(token))
}

/// In-memory store: one ordered map from key to expiry instant.
///
/// Expired keys are invisible to reads and are dropped on writes and
/// [`RevocationStore::purge_expired`].
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: Mutex<BTreeMap<String, Instant>>,
}

impl MemoryRevocationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn is_live(&self, key: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|expiry| *expiry > Instant::now())
    }

    async fn insert(&self, key: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expiry| *expiry > now);
        entries.insert(key, now + ttl);
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<()> {
        self.insert(blacklist_key(token), ttl).await;
        Ok(())
    }

    async fn blacklist_if_absent(&self, token: &str, ttl: Duration) -> Result<bool> {
        let key = blacklist_key(token);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(&key).is_some_and(|expiry| *expiry > now) {
            return Ok(false);
        }
        entries.insert(key, now + ttl);
        Ok(true)
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        Ok(self.is_live(&blacklist_key(token)).await)
    }

    async fn index_user_token(&self, user_id: Uuid, token: &str, ttl: Duration) -> Result<()> {
        self.insert(user_token_key(user_id, token), ttl).await;
        Ok(())
    }

    async fn is_user_token_live(&self, user_id: Uuid, token: &str) -> Result<bool> {
        Ok(self.is_live(&user_token_key(user_id, token)).await)
    }

    async fn remove_user_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .remove(&user_token_key(user_id, token));
        Ok(())
    }

    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<u64> {
        let prefix = user_prefix(user_id);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let keys: Vec<String> = entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();

        let mut live = 0;
        for key in keys {
            if entries.remove(&key).is_some_and(|expiry| expiry > now) {
                live += 1;
            }
        }
        Ok(live)
    }

    async fn list_user_tokens(&self, user_id: Uuid) -> Result<Vec<String>> {
        let prefix = user_prefix(user_id);
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, expiry)| **expiry > now)
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        Ok((before - entries.len()) as u64)
    }
}
