//! Text in, execution report out.

use crate::executor::{Abort, AbortReason, ExecutionReport, Executor};
use crate::session::SessionContext;
use stepline_dsl::{compile_source, CompileError, DslError, Overrides, ValidationIssue};
use tracing::{debug, error, instrument};

/// A finished pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub warnings: Vec<ValidationIssue>,
    pub report: ExecutionReport,
}

/// Parses, validates, compiles and executes one definition.
///
/// Parse and validation failures come back as errors and nothing is sent.
/// A compiler invariant violation is not an input problem; it is reported
/// as an aborted run with `compiler-invariant-violated`.
#[instrument(skip_all)]
pub async fn run_source(
    executor: &Executor,
    text: &str,
    overrides: &Overrides,
    session: &mut SessionContext,
) -> Result<PipelineRun, DslError> {
    match compile_source(text, overrides) {
        Ok(compiled) => {
            debug!(
                operations = compiled.operations.len(),
                warnings = compiled.warnings.len(),
                "Compiled definition"
            );
            let report = executor.execute(&compiled.operations, session).await;
            Ok(PipelineRun {
                warnings: compiled.warnings,
                report,
            })
        }
        Err(DslError::Compile(CompileError::InvariantViolated(message))) => {
            error!("Compiler invariant violated: {}", message);
            let abort = Abort::new(AbortReason::CompilerInvariantViolated, message, None);
            Ok(PipelineRun {
                warnings: Vec::new(),
                report: ExecutionReport::aborted_before_start(session.state(), abort, 0),
            })
        }
        Err(err) => Err(err),
    }
}
