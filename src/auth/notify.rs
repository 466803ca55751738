//! Outbound notification delivery.
//!
//! Registration, verification and password reset hand messages to a
//! [`NotificationGateway`]. Delivery is fire-and-forget: the engine spawns the
//! call and only logs failures, so a flaky SMS or email provider never fails the
//! parent operation.
//!
//! Gateways are explicit objects built once at startup and injected:
//!
//! - [`LogNotificationGateway`] logs instead of sending (local development).
//! - [`HttpNotificationGateway`] posts JSON to a delivery service at
//!   `<base>/email` or `<base>/sms`, retrying with exponential backoff and
//!   jitter.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use super::identity::Identity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    fn path(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    /// Address of `identity` on this channel, if it has one.
    #[must_use]
    pub fn address(self, identity: &Identity) -> Option<&str> {
        match self {
            Self::Email => identity.email.as_deref(),
            Self::Sms => identity.phone.as_deref(),
        }
    }
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_verification_code(
        &self,
        identity: &Identity,
        channel: Channel,
        code: &str,
    ) -> Result<()>;

    async fn send_password_reset(
        &self,
        identity: &Identity,
        channel: Channel,
        token: &str,
    ) -> Result<()>;

    /// In-app welcome message.
    async fn send_welcome(&self, identity: &Identity) -> Result<()>;
}

/// Local dev gateway that logs deliveries instead of sending them.
#[derive(Clone, Debug, Default)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send_verification_code(
        &self,
        identity: &Identity,
        channel: Channel,
        code: &str,
    ) -> Result<()> {
        info!(user_id = %identity.id, ?channel, "verification code delivery stub");
        debug!(user_id = %identity.id, code, "verification code");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        identity: &Identity,
        channel: Channel,
        token: &str,
    ) -> Result<()> {
        info!(user_id = %identity.id, ?channel, "password reset delivery stub");
        debug!(user_id = %identity.id, token, "password reset token");
        Ok(())
    }

    async fn send_welcome(&self, identity: &Identity) -> Result<()> {
        info!(user_id = %identity.id, name = %identity.full_name, "welcome notification stub");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HttpGatewayConfig {
    timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl HttpGatewayConfig {
    /// Default: 5s request timeout, 3 attempts, 500ms->5s backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max.max(base);
        self
    }
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HttpNotificationGateway {
    client: Client,
    base_url: Url,
    config: HttpGatewayConfig,
}

impl HttpNotificationGateway {
    /// Build the gateway and its HTTP client.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(base_url: &str, config: HttpGatewayConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("invalid notification URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("failed to build notification HTTP client")?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint(&self, channel: Channel) -> Result<Url> {
        self.base_url
            .join(channel.path())
            .context("failed to build notification endpoint")
    }

    async fn deliver(
        &self,
        channel: Channel,
        to: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let url = self.endpoint(channel)?;
        let body = json!({ "to": to, "template": template, "data": data });
        let span = tracing::info_span!("notification.deliver", channel = channel.path(), template);

        let outcome: Result<()> = async {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let result = self
                    .client
                    .post(url.clone())
                    .json(&body)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status);

                match result {
                    Ok(_) => return Ok(()),
                    Err(err) if attempt < self.config.max_attempts => {
                        let delay =
                            backoff_delay(attempt, self.config.backoff_base, self.config.backoff_max);
                        warn!(attempt, ?delay, "notification delivery failed, retrying: {err}");
                        sleep(delay).await;
                    }
                    Err(err) => bail!("notification delivery failed after {attempt} attempts: {err}"),
                }
            }
        }
        .instrument(span)
        .await;
        outcome
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send_verification_code(
        &self,
        identity: &Identity,
        channel: Channel,
        code: &str,
    ) -> Result<()> {
        let to = channel
            .address(identity)
            .context("identity has no address for channel")?;
        self.deliver(
            channel,
            to,
            "verification_code",
            json!({ "code": code, "language": identity.language }),
        )
        .await
    }

    async fn send_password_reset(
        &self,
        identity: &Identity,
        channel: Channel,
        token: &str,
    ) -> Result<()> {
        let to = channel
            .address(identity)
            .context("identity has no address for channel")?;
        self.deliver(
            channel,
            to,
            "password_reset",
            json!({ "token": token, "language": identity.language }),
        )
        .await
    }

    async fn send_welcome(&self, identity: &Identity) -> Result<()> {
        let url = self
            .base_url
            .join("in-app")
            .context("failed to build notification endpoint")?;
        self.client
            .post(url)
            .json(&json!({
                "user_id": identity.id,
                "template": "welcome",
                "data": { "full_name": identity.full_name, "language": identity.language },
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context("welcome notification failed")?;
        Ok(())
    }
}

/// Run a delivery in the background; failures are logged, never returned.
pub(crate) fn dispatch<F>(what: &'static str, user_id: uuid::Uuid, delivery: F)
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = delivery.await {
            warn!(%user_id, what, "notification dispatch failed: {err:#}");
        }
    });
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
