use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::identity::config::{DEFAULT_MFA_CHALLENGE_TTL_SECONDS, DEFAULT_SESSION_TTL_SECONDS};

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_MFA_CHALLENGE_TTL_SECONDS: &str = "mfa-challenge-ttl-seconds";
pub const ARG_MFA_SECRET_KEY: &str = "mfa-secret-key";
pub const ARG_PASSWORD_PEPPER: &str = "password-pepper";

#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub session_cookie_secure: bool,
    pub mfa_challenge_ttl_seconds: i64,
    pub mfa_secret_key: Option<SecretString>,
    pub password_pepper: Option<SecretString>,
}

impl Options {
    /// # Errors
    /// Never fails today; kept fallible like the other option groups.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
            session_cookie_secure: matches.get_flag(ARG_SESSION_COOKIE_SECURE),
            mfa_challenge_ttl_seconds: matches
                .get_one::<i64>(ARG_MFA_CHALLENGE_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_MFA_CHALLENGE_TTL_SECONDS),
            mfa_secret_key: secret(matches, ARG_MFA_SECRET_KEY),
            password_pepper: secret(matches, ARG_PASSWORD_PEPPER),
        })
    }
}

fn secret(matches: &ArgMatches, id: &str) -> Option<SecretString> {
    matches
        .get_one::<String>(id)
        .filter(|value| !value.is_empty())
        .map(|value| SecretString::from(value.clone()))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("IAM_SESSION_TTL_SECONDS")
                .global(true)
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("IAM_SESSION_COOKIE_SECURE")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_MFA_CHALLENGE_TTL_SECONDS)
                .long(ARG_MFA_CHALLENGE_TTL_SECONDS)
                .help("Lifetime of a one-time MFA code in seconds")
                .env("IAM_MFA_CHALLENGE_TTL_SECONDS")
                .global(true)
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MFA_SECRET_KEY)
                .long(ARG_MFA_SECRET_KEY)
                .help("Base64 32-byte key sealing MFA method secrets")
                .long_help(
                    "Base64-encoded 32-byte key for MFA method secrets. Required with PostgreSQL; \
                     memory:// generates a throwaway key when unset.",
                )
                .env("IAM_MFA_SECRET_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD_PEPPER)
                .long(ARG_PASSWORD_PEPPER)
                .help("Server-side secret mixed into password hashes")
                .env("IAM_PASSWORD_PEPPER")
                .hide_env_values(true)
                .global(true),
        )
}
