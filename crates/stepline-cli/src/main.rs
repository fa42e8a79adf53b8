use anyhow::Context as _;
use clap::Parser;
use std::process::ExitCode;
use stepline_cli::{dispatch, exit_codes, logging, Cli, Config, Context};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(err.exit_code());
        }
    };

    if let Err(err) = logging::init_logging(&config.logging, cli.verbose)
        .context("Failed to initialize logging")
    {
        eprintln!("error: {:#}", err);
        return ExitCode::from(exit_codes::GENERAL);
    }
    for rejected in &config.rejected_env {
        warn!("{}", rejected);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let ctx = Context::new(config, cli.format);
    match dispatch(&cli.command, &ctx, cancel).await {
        Ok(output) => {
            for note in &output.notes {
                eprintln!("{}", note);
            }
            if !output.stdout.is_empty() {
                println!("{}", output.stdout);
            }
            ExitCode::from(output.exit_code)
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
