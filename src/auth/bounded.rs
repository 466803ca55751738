//! Timeouts and bounded retries around collaborator calls.
//!
//! Reads on validation paths fail closed: an error or timeout becomes
//! [`AuthError::Unavailable`]. Revocation writes on logout/rotation are retried a
//! bounded number of times before the caller decides how loud to be.

use anyhow::anyhow;
use std::{future::Future, time::Duration};
use tokio::time::timeout;
use tracing::{error, warn};
use uuid::Uuid;

use super::error::AuthError;

/// Await `call` with a deadline, mapping any failure to `Unavailable`.
pub(crate) async fn bounded<T, Fut>(
    deadline: Duration,
    what: &'static str,
    call: Fut,
) -> Result<T, AuthError>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match timeout(deadline, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!(what, "collaborator call failed: {err:#}");
            Err(AuthError::Unavailable)
        }
        Err(_) => {
            error!(what, ?deadline, "collaborator call timed out");
            Err(AuthError::Unavailable)
        }
    }
}

/// Retry an idempotent write up to `attempts` times, each under `deadline`.
pub(crate) async fn bounded_retry<T, F, Fut>(
    deadline: Duration,
    attempts: u32,
    what: &'static str,
    mut call: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = anyhow!("{what}: no attempt made");
    for attempt in 1..=attempts {
        match timeout(deadline, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                warn!(what, attempt, "write failed: {err:#}");
                last_error = err;
            }
            Err(_) => {
                warn!(what, attempt, ?deadline, "write timed out");
                last_error = anyhow!("{what}: timed out after {deadline:?}");
            }
        }
    }
    Err(last_error)
}

/// Revocation write that must not fail the caller.
///
/// After the retries are spent the failure is logged as a security anomaly:
/// the affected token may stay usable until its natural expiry.
pub(crate) async fn revocation_write<T, F, Fut>(
    deadline: Duration,
    attempts: u32,
    what: &'static str,
    user_id: Uuid,
    call: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match bounded_retry(deadline, attempts, what, call).await {
        Ok(value) => Some(value),
        Err(err) => {
            error!(
                %user_id,
                what,
                security_anomaly = true,
                "revocation write failed, token may remain usable until expiry: {err:#}"
            );
            None
        }
    }
}
