pub mod auth;
pub mod database;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const CMD_SERVER: &str = "server";
pub const CMD_CHECK_DB: &str = "check-db";
pub const CMD_CREATE_USER: &str = "create-user";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("iam")
        .about("Identity and Access Management")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("IAM_PORT")
                .global(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .subcommand(Command::new(CMD_SERVER).about("Run the HTTP API (default)"))
        .subcommand(Command::new(CMD_CHECK_DB).about("Check that the store is reachable"))
        .subcommand(create_user());

    let command = database::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}

fn create_user() -> Command {
    Command::new(CMD_CREATE_USER)
        .about("Provision a local account")
        .arg(
            Arg::new("username")
                .long("username")
                .help("Login name (case-sensitive)")
                .required(true),
        )
        .arg(
            Arg::new("email")
                .long("email")
                .help("Email address")
                .required(true),
        )
        .arg(
            Arg::new("display-name")
                .long("display-name")
                .help("Display name, defaults to the username"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Initial password")
                .env("IAM_CREATE_USER_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .help("Role to grant, created when missing"),
        )
}
