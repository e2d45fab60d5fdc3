use crate::cli::actions::{Action, check_db, create_user, server};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::CheckDb(args) => check_db::execute(args).await,
        Action::CreateUser(args) => create_user::execute(args).await,
    }
}
