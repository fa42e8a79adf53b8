//! Command handlers.
//!
//! Handlers return their output instead of printing it, so they can be
//! driven from tests.

pub mod compile;
pub mod run;
pub mod session;
pub mod validate;

use crate::config::Config;
use crate::error::{exit_codes, CliError, CliResult};
use crate::output::OutputFormat;
use std::path::Path;
use stepline_dsl::{Literal, Overrides};

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config: Config, format: Option<OutputFormat>) -> Self {
        let format = format.unwrap_or(config.output);
        Self { config, format }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Printed to stdout
    pub stdout: String,
    /// Diagnostics printed to stderr, e.g. validation warnings
    pub notes: Vec<String>,
    pub exit_code: u8,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            notes: Vec::new(),
            exit_code: exit_codes::SUCCESS,
        }
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// Reads a definition file.
pub fn read_definition(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Collects `--var` flags; a later flag for the same name wins.
pub fn overrides(vars: &[(String, Literal)]) -> Overrides {
    vars.iter().cloned().collect()
}
