//! # Stepline CLI
//!
//! The `stepline` binary: argument parsing, layered configuration, logging
//! setup, the HTTP step service and output rendering. This is the only
//! crate that reads the process environment.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod output;

pub use cli::{Cli, Command};
pub use commands::{CommandOutput, Context};
pub use config::Config;
pub use error::{exit_codes, CliError, CliResult};

use tokio_util::sync::CancellationToken;

/// Runs one parsed command.
pub async fn dispatch(
    command: &Command,
    ctx: &Context,
    cancel: CancellationToken,
) -> CliResult<CommandOutput> {
    match command {
        Command::Validate(args) => commands::validate::execute(ctx, args),
        Command::Compile(args) => commands::compile::execute(ctx, args),
        Command::Run(args) => commands::run::execute(ctx, args, cancel).await,
        Command::Session(command) => commands::session::execute(ctx, command).await,
    }
}

/// Returns a version string for the Stepline CLI crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
