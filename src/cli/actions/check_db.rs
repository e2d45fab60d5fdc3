use anyhow::{Context, Result};
use tracing::info;

use super::store;
use crate::cli::commands::database;

#[derive(Debug)]
pub struct Args {
    pub database: database::Options,
}

/// Connect and ping the store once.
/// # Errors
/// Returns an error if the store cannot be reached.
pub async fn execute(args: Args) -> Result<()> {
    let dsn = store::redact_dsn(&args.database.dsn);
    let store = store::open(&args.database).await?;
    store
        .ping()
        .await
        .with_context(|| format!("Store at {dsn} did not answer"))?;
    info!(dsn = %dsn, "Store reachable");
    println!("Database connection OK");
    Ok(())
}
