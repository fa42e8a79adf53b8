//! Structured logging using tracing.
//!
//! Logs go to stderr so that stdout carries only command output.

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Filter applied when neither `RUST_LOG` nor `--verbose` says otherwise.
fn base_filter(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "info,stepline_core=debug,stepline_dsl=debug,stepline_cli=debug".to_string()
    } else {
        config.level.clone()
    }
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(base_filter(config, verbose)))
        .context("Invalid log filter")?;

    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let pretty_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(verbose)
            .with_file(verbose)
            .with_line_number(verbose)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .context("Failed to set global default subscriber")?;

    debug!(
        log_format = if config.json { "json" } else { "pretty" },
        "Logging initialized"
    );
    Ok(())
}
