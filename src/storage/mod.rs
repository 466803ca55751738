//! Postgres adapters for the engine's collaborator traits.
//!
//! Every statement runs inside a `db.query` span carrying `db.system`,
//! `db.operation` and `db.statement`.

mod cleaner;
mod revocation;
mod users;

pub use cleaner::spawn_purge_task;
pub use revocation::PgRevocationStore;
pub use users::{PgStaffProfiles, PgUserDirectory};

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::Span;

/// Schema applied by operators before first start.
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Build the pool. Connections are opened lazily so the server can start
/// (and report an unhealthy database) before Postgres is reachable.
///
/// # Errors
/// Returns an error if the DSN cannot be parsed.
pub fn connect(dsn: &str, acquire_timeout: Duration) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(dsn)
        .context("Failed to build database pool")
}

fn query_span(operation: &'static str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
