//! Assertions over [`ExecutionReport`]s.

use stepline_core::{ExecutionReport, Outcome, RunStatus};
use thiserror::Error;

/// Error type for report validation failures
#[derive(Debug, Error, PartialEq)]
pub enum ReportValidationError {
    #[error("Invalid run status: expected {expected}, got {actual}")]
    InvalidStatus { expected: String, actual: String },

    #[error("Position gap at operation {order}: expected {expected}, got {actual}")]
    PositionGap { order: usize, expected: u32, actual: u32 },

    #[error("Next position mismatch: expected {expected}, got {actual}")]
    NextPositionMismatch { expected: u32, actual: u32 },

    #[error("Operation {order} was expected to {expected}")]
    UnexpectedOutcome { order: usize, expected: String },

    #[error("Operation {0} is missing from the report")]
    MissingOperation(usize),
}

/// Asserts the run ended with `expected`.
pub fn assert_run_status(
    report: &ExecutionReport,
    expected: RunStatus,
) -> Result<(), ReportValidationError> {
    if report.status != expected {
        return Err(ReportValidationError::InvalidStatus {
            expected: expected.to_string(),
            actual: report.status.to_string(),
        });
    }
    Ok(())
}

/// Asserts succeeded steps occupy `start_position, start_position + 1, ...`
/// with no gaps, and that the report's next position follows the last one.
///
/// Failed attempts are sent to the position the next success will take, so
/// they are checked against it too.
pub fn assert_positions_contiguous(report: &ExecutionReport) -> Result<(), ReportValidationError> {
    let mut expected = report.start_position;
    for result in &report.results {
        if result.position != expected {
            return Err(ReportValidationError::PositionGap {
                order: result.order,
                expected,
                actual: result.position,
            });
        }
        if result.outcome == Outcome::Succeeded {
            expected += 1;
        }
    }
    if report.next_position != expected {
        return Err(ReportValidationError::NextPositionMismatch {
            expected,
            actual: report.next_position,
        });
    }
    Ok(())
}

/// Asserts operation `order` succeeded.
pub fn assert_operation_succeeded(
    report: &ExecutionReport,
    order: usize,
) -> Result<(), ReportValidationError> {
    assert_outcome(report, order, Outcome::Succeeded, "succeed")
}

/// Asserts operation `order` failed.
pub fn assert_operation_failed(
    report: &ExecutionReport,
    order: usize,
) -> Result<(), ReportValidationError> {
    assert_outcome(report, order, Outcome::Failed, "fail")
}

fn assert_outcome(
    report: &ExecutionReport,
    order: usize,
    outcome: Outcome,
    verb: &str,
) -> Result<(), ReportValidationError> {
    let result = report
        .results
        .iter()
        .find(|r| r.order == order)
        .ok_or(ReportValidationError::MissingOperation(order))?;
    if result.outcome != outcome {
        return Err(ReportValidationError::UnexpectedOutcome {
            order,
            expected: verb.to_string(),
        });
    }
    Ok(())
}
