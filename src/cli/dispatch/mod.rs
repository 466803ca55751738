use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let string = |id: &str| -> Result<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing required argument: --{id}"))
    };
    let seconds = |id: &str, default: i64| matches.get_one::<i64>(id).copied().unwrap_or(default);

    Ok(Action::Server(Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: string("dsn")?,
        access_secret: SecretString::from(string("access-secret")?),
        refresh_secret: SecretString::from(string("refresh-secret")?),
        access_ttl_seconds: seconds("access-ttl-seconds", 86_400),
        refresh_ttl_seconds: seconds("refresh-ttl-seconds", 604_800),
        verification_code_ttl_seconds: seconds("verification-code-ttl-seconds", 600),
        reset_token_ttl_seconds: seconds("reset-token-ttl-seconds", 3_600),
        default_country_code: string("default-country-code")?,
        store_timeout: Duration::from_millis(
            matches
                .get_one::<u64>("store-timeout-ms")
                .copied()
                .unwrap_or(2_000),
        ),
        store_write_attempts: matches
            .get_one::<u32>("store-write-attempts")
            .copied()
            .unwrap_or(3),
        notification_url: matches.get_one::<String>("notification-url").cloned(),
        purge_interval: Duration::from_secs(
            matches
                .get_one::<u64>("revocation-purge-seconds")
                .copied()
                .unwrap_or(60),
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_builds_server_args() -> Result<()> {
        temp_env::with_vars(
            [
                ("TESSERA_NOTIFICATION_URL", None::<&str>),
                ("TESSERA_STORE_TIMEOUT_MS", None),
            ],
            || {
                let matches = commands::new().get_matches_from([
                    "tessera",
                    "--port",
                    "9090",
                    "--dsn",
                    "postgres://localhost/tessera",
                    "--access-secret",
                    "a-secret",
                    "--refresh-secret",
                    "r-secret",
                    "--refresh-ttl-seconds",
                    "120",
                    "--revocation-purge-seconds",
                    "15",
                ]);

                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost/tessera");
                assert_eq!(args.access_secret.expose_secret(), "a-secret");
                assert_eq!(args.refresh_secret.expose_secret(), "r-secret");
                assert_eq!(args.refresh_ttl_seconds, 120);
                assert_eq!(args.access_ttl_seconds, 86_400);
                assert_eq!(args.store_timeout, Duration::from_millis(2_000));
                assert_eq!(args.purge_interval, Duration::from_secs(15));
                assert!(args.notification_url.is_none());
                Ok(())
            },
        )
    }
}
