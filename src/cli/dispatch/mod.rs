//! Map validated CLI matches to an [`Action`].
//!
//! Without a subcommand the server runs. Global options may appear before or
//! after the subcommand, so they are read from the innermost matches.

use crate::cli::actions::{Action, check_db, create_user, server};
use crate::cli::commands::{CMD_CHECK_DB, CMD_CREATE_USER, auth, database};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_CHECK_DB, sub)) => Ok(Action::CheckDb(check_db::Args {
            database: database::Options::parse(sub)?,
        })),
        Some((CMD_CREATE_USER, sub)) => {
            let username = sub
                .get_one::<String>("username")
                .cloned()
                .context("missing required argument: --username")?;
            let display_name = sub
                .get_one::<String>("display-name")
                .cloned()
                .unwrap_or_else(|| username.clone());
            Ok(Action::CreateUser(create_user::Args {
                database: database::Options::parse(sub)?,
                auth: auth::Options::parse(sub)?,
                email: sub
                    .get_one::<String>("email")
                    .cloned()
                    .context("missing required argument: --email")?,
                password: sub
                    .get_one::<String>("password")
                    .map(|value| SecretString::from(value.clone()))
                    .context("missing required argument: --password")?,
                role: sub.get_one::<String>("role").cloned(),
                username,
                display_name,
            }))
        }
        Some((_, sub)) => server_action(sub),
        None => server_action(matches),
    }
}

fn server_action(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        database: database::Options::parse(matches)?,
        auth: auth::Options::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("IAM_DSN", None::<&str>),
                ("IAM_PORT", None),
                ("IAM_MFA_SECRET_KEY", None),
                ("IAM_PASSWORD_PEPPER", None),
                ("IAM_CREATE_USER_PASSWORD", None),
            ],
            f,
        );
    }

    #[test]
    fn default_action_is_server() {
        clean_env(|| {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "iam",
                "--dsn",
                "memory://",
                "--port",
                "9000",
            ]);
            let action = handler(&matches);
            assert!(matches!(
                action,
                Ok(Action::Server(ref args)) if args.port == 9000 && args.database.is_memory()
            ));
        });
    }

    #[test]
    fn options_after_subcommand() {
        clean_env(|| {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "iam",
                "check-db",
                "--dsn",
                "postgres://localhost/iam",
                "--db-timeout-seconds",
                "2",
            ]);
            let action = handler(&matches);
            assert!(matches!(
                action,
                Ok(Action::CheckDb(ref args))
                    if args.database.dsn == "postgres://localhost/iam"
                        && args.database.timeout_seconds == 2
            ));
        });
    }

    #[test]
    fn create_user_defaults_display_name() {
        clean_env(|| {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "iam",
                "--dsn",
                "memory://",
                "create-user",
                "--username",
                "alice",
                "--email",
                "alice@example.com",
                "--password",
                "pw",
            ]);
            let action = handler(&matches);
            assert!(matches!(
                action,
                Ok(Action::CreateUser(ref args))
                    if args.display_name == "alice" && args.role.is_none()
            ));
        });
    }
}
