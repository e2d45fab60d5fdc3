use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;

use super::store;
use crate::{
    cli::commands::{auth, database},
    identity::{
        AuthConfig, IamError, IamService, MfaConfig, NewAccount, models::AuthProvider,
    },
    store::IamStore,
};

#[derive(Debug)]
pub struct Args {
    pub database: database::Options,
    pub auth: auth::Options,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: SecretString,
    pub role: Option<String>,
}

/// Provision a local account and optionally grant it a role.
/// # Errors
/// Returns an error if the store is unreachable or the user cannot be created.
pub async fn execute(args: Args) -> Result<()> {
    let store = store::open(&args.database).await?;
    let user_id = provision(store, &args).await?;
    println!("Created user {} (id {user_id})", args.username);
    Ok(())
}

async fn provision(store: Arc<dyn IamStore>, args: &Args) -> Result<i64> {
    let auth_config = AuthConfig::new()
        .with_password_pepper(store::pepper_bytes(args.auth.password_pepper.as_ref()));
    let service = IamService::new(store, auth_config, MfaConfig::new());

    let user = service
        .provision_user(NewAccount {
            parent_id: 0,
            username: args.username.clone(),
            email: args.email.clone(),
            phone_number: None,
            display_name: args.display_name.clone(),
            auth_provider: AuthProvider::Local,
            password: Some(args.password.expose_secret().to_string()),
            created_by: Some("cli".to_string()),
        })
        .await
        .with_context(|| format!("Failed to create user {}", args.username))?;
    info!(user_id = user.user_id, username = %user.username, "User created");

    if let Some(role) = &args.role {
        match service.create_role(role, None).await {
            Ok(_) => info!(role = %role, "Role created"),
            Err(IamError::Conflict(_)) => {}
            Err(err) => return Err(err).context("Failed to create role"),
        }
        service
            .assign_role(user.user_id, role, Some("cli"))
            .await
            .with_context(|| format!("Failed to assign role {role}"))?;
        info!(user_id = user.user_id, role = %role, "Role assigned");
    }

    Ok(user.user_id)
}
