//! Error types for the stepline CLI

use stepline_core::{AbortReason, CoreError, ExecutionReport, RunStatus};
use stepline_dsl::{CompileError, DslError};
use thiserror::Error;

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL: u8 = 1;
    /// Some operations failed remotely, the rest were created
    pub const PARTIAL: u8 = 3;
    pub const TIMED_OUT: u8 = 4;
    pub const CANCELLED: u8 = 5;
    pub const RESOURCE_MISSING: u8 = 6;
    /// The definition did not parse or validate
    pub const INVALID_DEFINITION: u8 = 9;
}

/// CLI error types
#[derive(Error, Debug)]
pub enum CliError {
    /// A definition did not parse, validate or compile
    #[error("{file}: {source}")]
    Definition {
        file: String,
        #[source]
        source: DslError,
    },

    /// Runtime failure outside of a run report
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad combination of arguments
    #[error("Usage error: {0}")]
    Usage(String),

    /// Reading a definition or config file failed
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Rendering output failed
    #[error("Output error: {0}")]
    Output(String),
}

/// Type alias for results with CliError
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Definition {
                source: DslError::Compile(CompileError::InvariantViolated(_)),
                ..
            } => exit_codes::GENERAL,
            CliError::Definition { .. } => exit_codes::INVALID_DEFINITION,
            _ => exit_codes::GENERAL,
        }
    }
}

impl CliError {
    pub fn definition(file: impl Into<String>, source: impl Into<DslError>) -> Self {
        CliError::Definition {
            file: file.into(),
            source: source.into(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

/// Exit code for a finished run.
pub fn report_exit_code(report: &ExecutionReport) -> u8 {
    match report.status {
        RunStatus::Complete => exit_codes::SUCCESS,
        RunStatus::Partial => exit_codes::PARTIAL,
        RunStatus::Aborted => match report.abort.as_ref().map(|a| a.reason) {
            Some(AbortReason::TimedOut) => exit_codes::TIMED_OUT,
            Some(AbortReason::Cancelled) => exit_codes::CANCELLED,
            Some(AbortReason::ResourceMissing) => exit_codes::RESOURCE_MISSING,
            _ => exit_codes::GENERAL,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_core::{Abort, SessionState};
    use stepline_dsl::ParseError;

    #[test]
    fn test_error_exit_codes() {
        let cases = vec![
            (CliError::definition("a.yaml", ParseError::new(1, "bad")), 9),
            (
                CliError::definition("a.yaml", CompileError::InvariantViolated("x".into())),
                1,
            ),
            (CliError::Core(CoreError::NoSession("none".into())), 1),
            (CliError::Usage("two files, one checkpoint".into()), 1),
        ];

        for (error, expected) in cases {
            assert_eq!(error.exit_code(), expected, "{}", error);
        }
    }

    #[test]
    fn test_report_exit_codes() {
        let aborted = |reason| {
            ExecutionReport::aborted_before_start(SessionState::start(1), Abort::new(reason, "x", None), 0)
        };

        assert_eq!(report_exit_code(&aborted(AbortReason::TimedOut)), 4);
        assert_eq!(report_exit_code(&aborted(AbortReason::Cancelled)), 5);
        assert_eq!(report_exit_code(&aborted(AbortReason::ResourceMissing)), 6);
        assert_eq!(report_exit_code(&aborted(AbortReason::SessionPersistFailed)), 1);

        let mut partial = aborted(AbortReason::Cancelled);
        partial.status = RunStatus::Partial;
        partial.abort = None;
        assert_eq!(report_exit_code(&partial), 3);
    }
}
