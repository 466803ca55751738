use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::auth::{utils::token_fingerprint, RevocationStore};

/// [`RevocationStore`] over `revoked_tokens` and `user_tokens`.
///
/// TTLs become absolute `expires_at` timestamps; every read filters on
/// `expires_at > NOW()`, so expired rows are invisible until purged.
#[derive(Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<()> {
        let query = r"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, NOW() + make_interval(secs => $2))
            ON CONFLICT (token_hash)
            DO UPDATE SET expires_at = GREATEST(revoked_tokens.expires_at, EXCLUDED.expires_at)
        ";
        sqlx::query(query)
            .bind(token_fingerprint(token))
            .bind(ttl.as_secs_f64())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to blacklist token")?;
        Ok(())
    }

    async fn blacklist_if_absent(&self, token: &str, ttl: Duration) -> Result<bool> {
        // An expired row may be reclaimed; a live one makes the upsert a no-op.
        let query = r"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, NOW() + make_interval(secs => $2))
            ON CONFLICT (token_hash)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE revoked_tokens.expires_at <= NOW()
            RETURNING token_hash
        ";
        let claimed = sqlx::query_scalar::<_, String>(query)
            .bind(token_fingerprint(token))
            .bind(ttl.as_secs_f64())
            .fetch_optional(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to claim token")?;
        Ok(claimed.is_some())
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM revoked_tokens WHERE token_hash = $1 AND expires_at > NOW()
            )
        ";
        sqlx::query_scalar::<_, bool>(query)
            .bind(token_fingerprint(token))
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check token blacklist")
    }

    async fn index_user_token(&self, user_id: Uuid, token: &str, ttl: Duration) -> Result<()> {
        let query = r"
            INSERT INTO user_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (user_id, token_hash) DO UPDATE SET expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(token_fingerprint(token))
            .bind(ttl.as_secs_f64())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to index user token")?;
        Ok(())
    }

    async fn is_user_token_live(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM user_tokens
                WHERE user_id = $1 AND token_hash = $2 AND expires_at > NOW()
            )
        ";
        sqlx::query_scalar::<_, bool>(query)
            .bind(user_id)
            .bind(token_fingerprint(token))
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check user token")
    }

    async fn remove_user_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        let query = "DELETE FROM user_tokens WHERE user_id = $1 AND token_hash = $2";
        sqlx::query(query)
            .bind(user_id)
            .bind(token_fingerprint(token))
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to remove user token")?;
        Ok(())
    }

    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<u64> {
        let query = r"
            WITH deleted AS (
                DELETE FROM user_tokens WHERE user_id = $1 RETURNING expires_at
            )
            SELECT COUNT(*) FILTER (WHERE expires_at > NOW()) FROM deleted
        ";
        let live = sqlx::query_scalar::<_, i64>(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to revoke user tokens")?;
        Ok(u64::try_from(live).unwrap_or(0))
    }

    async fn list_user_tokens(&self, user_id: Uuid) -> Result<Vec<String>> {
        let query = r"
            SELECT token_hash FROM user_tokens
            WHERE user_id = $1 AND expires_at > NOW()
            ORDER BY expires_at
        ";
        sqlx::query_scalar::<_, String>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list user tokens")
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut purged = 0;
        for query in [
            "DELETE FROM revoked_tokens WHERE expires_at <= NOW()",
            "DELETE FROM user_tokens WHERE expires_at <= NOW()",
        ] {
            purged += sqlx::query(query)
                .execute(&self.pool)
                .instrument(query_span("DELETE", query))
                .await
                .context("failed to purge expired revocation rows")?
                .rows_affected();
        }
        Ok(purged)
    }
}
