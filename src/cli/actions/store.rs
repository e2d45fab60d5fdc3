use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

use crate::{
    cli::commands::database,
    store::{
        IamStore,
        memory::MemoryStore,
        postgres::{PgStore, PoolSettings},
    },
};

/// Open the store named by `--dsn`.
pub(crate) async fn open(options: &database::Options) -> Result<Arc<dyn IamStore>> {
    if options.is_memory() {
        info!("Using in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let settings = PoolSettings {
        max_connections: options.max_connections,
        timeout: Duration::from_secs(options.timeout_seconds),
    };
    let store = PgStore::connect(&options.dsn, settings).await?;
    Ok(Arc::new(store))
}

/// The pepper is raw bytes of the configured string.
pub(crate) fn pepper_bytes(pepper: Option<&SecretString>) -> Option<Arc<[u8]>> {
    pepper.map(|secret| Arc::from(secret.expose_secret().as_bytes()))
}

/// DSN with any password masked, for logs.
pub(crate) fn redact_dsn(dsn: &str) -> String {
    if dsn.starts_with("memory://") {
        return dsn.to_string();
    }
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
