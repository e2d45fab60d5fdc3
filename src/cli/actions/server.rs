use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine, engine::general_purpose};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};

use super::store;
use crate::{
    api,
    cli::commands::{auth, database},
    identity::{AuthConfig, IamService, MfaConfig, mfa::MFA_KEY_LEN},
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub database: database::Options,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the MFA key is invalid, the store cannot be opened, or
/// the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let mfa_key = mfa_secret_key(args.auth.mfa_secret_key.as_ref(), args.database.is_memory())?;
    let store = store::open(&args.database).await?;

    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.auth.session_ttl_seconds)
        .with_session_cookie_secure(args.auth.session_cookie_secure)
        .with_password_pepper(store::pepper_bytes(args.auth.password_pepper.as_ref()));
    let mfa_config = MfaConfig::new()
        .with_challenge_ttl_seconds(args.auth.mfa_challenge_ttl_seconds)
        .with_secret_key(Some(mfa_key));

    let service = Arc::new(IamService::new(store, auth_config, mfa_config));

    api::new(args.port, service).await
}

/// Decode the configured key, or mint a throwaway one for `memory://`.
fn mfa_secret_key(configured: Option<&SecretString>, ephemeral_store: bool) -> Result<Arc<[u8]>> {
    let Some(encoded) = configured else {
        if !ephemeral_store {
            bail!("missing required argument: --mfa-secret-key (required with PostgreSQL)");
        }
        warn!("No MFA secret key configured; generated a throwaway key for this process");
        let mut key = [0u8; MFA_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        return Ok(Arc::from(key.as_slice()));
    };

    let key = general_purpose::STANDARD
        .decode(encoded.expose_secret().trim())
        .context("MFA secret key must be base64")?;
    if key.len() != MFA_KEY_LEN {
        return Err(anyhow!(
            "MFA secret key must decode to {MFA_KEY_LEN} bytes, got {}",
            key.len()
        ));
    }
    Ok(Arc::from(key))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", store::redact_dsn(&args.database.dsn)),
        (
            "db_max_connections",
            args.database.max_connections.to_string(),
        ),
        ("db_timeout_seconds", args.database.timeout_seconds.to_string()),
        (
            "session_ttl_seconds",
            args.auth.session_ttl_seconds.to_string(),
        ),
        (
            "session_cookie_secure",
            args.auth.session_cookie_secure.to_string(),
        ),
        (
            "mfa_challenge_ttl_seconds",
            args.auth.mfa_challenge_ttl_seconds.to_string(),
        ),
        (
            "mfa_secret_key_set",
            args.auth.mfa_secret_key.is_some().to_string(),
        ),
        (
            "password_pepper_set",
            args.auth.password_pepper.is_some().to_string(),
        ),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_requires_mfa_key() {
        assert!(mfa_secret_key(None, false).is_err());
        let generated = mfa_secret_key(None, true);
        assert!(matches!(generated, Ok(ref key) if key.len() == MFA_KEY_LEN));
    }

    #[test]
    fn mfa_key_must_be_32_bytes() {
        let good = SecretString::from(general_purpose::STANDARD.encode([7u8; 32]));
        assert!(matches!(mfa_secret_key(Some(&good), false), Ok(ref key) if key[0] == 7));

        let short = SecretString::from(general_purpose::STANDARD.encode([7u8; 16]));
        assert!(mfa_secret_key(Some(&short), false).is_err());

        let garbage = SecretString::from("%%%".to_string());
        assert!(mfa_secret_key(Some(&garbage), true).is_err());
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }
}
