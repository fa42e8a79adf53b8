//! # Stepline Core
//!
//! Runtime side of stepline: takes the operations compiled by
//! [`stepline_dsl`] and creates them as steps on a remote checkpoint.
//!
//! * [`session`] - checkpoint and next-position state, with file and memory stores
//! * [`normalizer`] - maps the service's reply shapes onto [`NormalizedResult`]
//! * [`retry`] - failure classification and backoff
//! * [`executor`] - sequential execution with retries, timeouts and cancellation
//! * [`batch`] - bounded concurrent execution of independent definitions
//! * [`pipeline`] - text to report in one call

pub mod batch;
pub mod error;
pub mod executor;
pub mod normalizer;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod session;

pub use batch::{BatchJob, BatchOutcome, BatchRunner};
pub use error::CoreError;
pub use executor::{
    Abort, AbortReason, ExecutionReport, ExecutionResult, Executor, ExecutorConfig, Outcome,
    RunStatus,
};
pub use normalizer::{normalize, ErrorKind, NormalizedResult, RawResponse, RemoteReply, TransportErrorKind};
pub use pipeline::{run_source, PipelineRun};
pub use retry::{classify, FailureClass, RetryPolicy};
pub use service::{StepRequest, StepService};
pub use session::{FileSessionStore, SessionContext, SessionState, SessionStore};

/// Returns a version string for the Stepline Core crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
