use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, query_span};
use crate::auth::{Identity, InsertOutcome, Role, StaffProfileDirectory, UserDirectory};

const SELECT_USER: &str = r"
    SELECT id, email, phone, password_hash, full_name, role, language,
           is_verified, verification_code, verification_code_expires_at, verified_at,
           is_active, deactivated_at, reset_token, reset_token_expires_at,
           last_login_at, created_at
    FROM users
";

const RETURNING_USER: &str = r"
    RETURNING id, email, phone, password_hash, full_name, role, language,
              is_verified, verification_code, verification_code_expires_at, verified_at,
              is_active, deactivated_at, reset_token, reset_token_expires_at,
              last_login_at, created_at
";

fn identity_from_row(row: &PgRow) -> Result<Identity> {
    let role: String = row.try_get("role")?;
    Ok(Identity {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        role: role.parse::<Role>().map_err(|err| anyhow!(err))?,
        language: row.try_get("language")?,
        is_verified: row.try_get("is_verified")?,
        verification_code: row.try_get("verification_code")?,
        verification_code_expires_at: row.try_get("verification_code_expires_at")?,
        verified_at: row.try_get("verified_at")?,
        is_active: row.try_get("is_active")?,
        deactivated_at: row.try_get("deactivated_at")?,
        reset_token: row.try_get("reset_token")?,
        reset_token_expires_at: row.try_get("reset_token_expires_at")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// [`UserDirectory`] over the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where<T>(&self, column: &'static str, value: T) -> Result<Option<Identity>>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let query = format!("{SELECT_USER} WHERE {column} = $1 LIMIT 1");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .with_context(|| format!("failed to lookup user by {column}"))?;
        row.as_ref().map(identity_from_row).transpose()
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.find_where("email", email.to_string()).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>> {
        self.find_where("phone", phone.to_string()).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        self.find_where("id", id).await
    }

    async fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Identity>> {
        let query = format!(
            "{SELECT_USER} WHERE ($1::text IS NOT NULL AND email = $1) \
             OR ($2::text IS NOT NULL AND phone = $2) LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .bind(phone)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by email or phone")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Identity>> {
        let query = format!(
            "{SELECT_USER} WHERE verification_code = $1 \
             ORDER BY verification_code_expires_at > NOW() DESC NULLS LAST, \
                      verification_code_expires_at DESC NULLS LAST \
             LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by verification code")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>> {
        self.find_where("reset_token", token.to_string()).await
    }

    async fn insert(&self, identity: &Identity) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO users
                (id, email, phone, password_hash, full_name, role, language,
                 is_verified, verification_code, verification_code_expires_at,
                 is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ";
        let result = sqlx::query(query)
            .bind(identity.id)
            .bind(identity.email.as_deref())
            .bind(identity.phone.as_deref())
            .bind(&identity.password_hash)
            .bind(&identity.full_name)
            .bind(identity.role.as_str())
            .bind(&identity.language)
            .bind(identity.is_verified)
            .bind(identity.verification_code.as_deref())
            .bind(identity.verification_code_expires_at)
            .bind(identity.is_active)
            .bind(identity.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE users SET last_login_at = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record login")?;
        if result.rows_affected() == 0 {
            bail!("user {id} not found");
        }
        Ok(())
    }

    async fn set_verification_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET verification_code = $2, verification_code_expires_at = $3
            WHERE id = $1 AND NOT is_verified
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(code)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to set verification code")?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_verification_code(
        &self,
        id: Uuid,
        code: &str,
        at: DateTime<Utc>,
        activate: bool,
    ) -> Result<Option<Identity>> {
        let query = format!(
            "UPDATE users SET \
                 is_verified = TRUE, \
                 verified_at = $3, \
                 verification_code = NULL, \
                 verification_code_expires_at = NULL, \
                 is_active = is_active OR ($4 AND deactivated_at IS NULL) \
             WHERE id = $1 AND verification_code = $2 \
             {RETURNING_USER}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(code)
            .bind(at)
            .bind(activate)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to consume verification code")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE users SET reset_token = $2, reset_token_expires_at = $3 WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to set reset token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_password(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET password_hash = $3, reset_token = NULL, reset_token_expires_at = NULL
            WHERE id = $1 AND reset_token = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to replace password")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_activation(&self, id: Uuid, active: bool) -> Result<bool> {
        let query = r"
            UPDATE users
            SET is_active = $2,
                deactivated_at = CASE WHEN $2 THEN NULL ELSE NOW() END
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update user activation")?;
        Ok(result.rows_affected() > 0)
    }
}

/// [`StaffProfileDirectory`] over the `staff_profiles` table.
#[derive(Clone)]
pub struct PgStaffProfiles {
    pool: PgPool,
}

impl PgStaffProfiles {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StaffProfileDirectory for PgStaffProfiles {
    async fn exists(&self, user_id: Uuid) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM staff_profiles WHERE user_id = $1)";
        sqlx::query_scalar::<_, bool>(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check staff profile")
    }
}
