use clap::{Arg, Command};

/// Collaborator call bounds and revocation housekeeping.
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("store-timeout-ms")
                .long("store-timeout-ms")
                .help("Deadline for each directory or revocation store call, in milliseconds")
                .default_value("2000")
                .env("TESSERA_STORE_TIMEOUT_MS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("store-write-attempts")
                .long("store-write-attempts")
                .help("Attempts for revocation writes before giving up")
                .default_value("3")
                .env("TESSERA_STORE_WRITE_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..=10)),
        )
        .arg(
            Arg::new("revocation-purge-seconds")
                .long("revocation-purge-seconds")
                .help("Interval between purges of expired revocation entries")
                .default_value("60")
                .env("TESSERA_REVOCATION_PURGE_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
