use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_TIMEOUT_SECONDS: &str = "db-timeout-seconds";

/// Connection settings shared by every subcommand.
#[derive(Clone, Debug)]
pub struct Options {
    pub dsn: String,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if `--dsn` is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .context("missing required argument: --dsn")?;
        let max_connections = matches
            .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
            .copied()
            .unwrap_or(5);
        let timeout_seconds = matches
            .get_one::<u64>(ARG_DB_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(5);
        Ok(Self {
            dsn,
            max_connections,
            timeout_seconds,
        })
    }

    /// `memory://` selects the in-process store.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.dsn.starts_with("memory://")
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string, or memory:// for a throwaway in-process store",
                )
                .env("IAM_DSN")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum pooled database connections")
                .env("IAM_DB_MAX_CONNECTIONS")
                .global(true)
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_TIMEOUT_SECONDS)
                .long(ARG_DB_TIMEOUT_SECONDS)
                .help("Pool acquire and statement timeout in seconds")
                .env("IAM_DB_TIMEOUT_SECONDS")
                .global(true)
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
