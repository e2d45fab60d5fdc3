pub mod check_db;
pub mod create_user;
pub mod server;

mod run;
mod store;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    CheckDb(check_db::Args),
    CreateUser(create_user::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
