use clap::{Arg, Command};

/// Signing secrets, token lifetimes and one-time code settings.
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-secret")
                .long("access-secret")
                .help("HMAC secret for access tokens")
                .env("TESSERA_ACCESS_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("refresh-secret")
                .long("refresh-secret")
                .help("HMAC secret for refresh tokens, must differ from the access secret")
                .env("TESSERA_REFRESH_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token lifetime in seconds")
                .default_value("86400")
                .env("TESSERA_ACCESS_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token lifetime in seconds")
                .default_value("604800")
                .env("TESSERA_REFRESH_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("verification-code-ttl-seconds")
                .long("verification-code-ttl-seconds")
                .help("Verification code lifetime in seconds")
                .default_value("600")
                .env("TESSERA_VERIFICATION_CODE_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token lifetime in seconds")
                .default_value("3600")
                .env("TESSERA_RESET_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("default-country-code")
                .long("default-country-code")
                .help("Country calling code applied to local phone numbers")
                .default_value("250")
                .env("TESSERA_DEFAULT_COUNTRY_CODE"),
        )
}
