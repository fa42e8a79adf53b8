//! Sends resolved operations to the step service, one at a time.
//!
//! Per operation: `pending -> sending -> (succeeded | retrying -> sending | failed)`.
//! Per run: `running -> (complete | partial | aborted)`.

use crate::normalizer::{normalize, NormalizedResult, RemoteReply};
use crate::retry::{classify, FailureClass, RetryPolicy};
use crate::service::{StepRequest, StepService};
use crate::session::{SessionContext, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stepline_dsl::{OperationKind, ResolvedOperation};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How one operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Interrupted mid-call; the step may or may not exist remotely
    Unknown,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Complete,
    Partial,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Complete => "complete",
            RunStatus::Partial => "partial",
            RunStatus::Aborted => "aborted",
        })
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    ResourceMissing,
    Cancelled,
    TimedOut,
    CompilerInvariantViolated,
    SessionPersistFailed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::ResourceMissing => "resource-missing",
            AbortReason::Cancelled => "cancelled",
            AbortReason::TimedOut => "timed-out",
            AbortReason::CompilerInvariantViolated => "compiler-invariant-violated",
            AbortReason::SessionPersistFailed => "session-persist-failed",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Abort {
    pub reason: AbortReason,
    pub message: String,
    /// Operation the run stopped at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
}

impl Abort {
    pub fn new(reason: AbortReason, message: impl Into<String>, order: Option<usize>) -> Self {
        Self {
            reason,
            message: message.into(),
            order,
        }
    }
}

/// Per-operation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub order: usize,

    /// Position the step was sent to
    pub position: u32,

    pub kind: OperationKind,

    pub outcome: Outcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Normalized error of the last attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NormalizedResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureClass>,

    pub latency_ms: u64,

    pub retries: u32,
}

/// Aggregate of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub status: RunStatus,
    pub checkpoint_id: i64,
    pub start_position: u32,
    pub next_position: u32,
    pub results: Vec<ExecutionResult>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<Abort>,
    /// Operations never attempted because the run stopped
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// A run that stopped before sending anything.
    pub fn aborted_before_start(state: SessionState, abort: Abort, skipped: usize) -> Self {
        Self {
            status: RunStatus::Aborted,
            checkpoint_id: state.checkpoint_id,
            start_position: state.next_position,
            next_position: state.next_position,
            results: Vec::new(),
            timed_out: abort.reason == AbortReason::TimedOut,
            abort: Some(abort),
            skipped,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.count(Outcome::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Limit for each remote call
    pub call_timeout: Duration,
    /// Limit for the whole run, checked between operations
    pub run_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            run_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of sending one operation, retries included.
struct Sent {
    result: ExecutionResult,
    abort: Option<Abort>,
}

/// Runs operations against a [`StepService`].
pub struct Executor {
    service: Arc<dyn StepService>,
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(service: Arc<dyn StepService>, config: ExecutorConfig) -> Self {
        Self {
            service,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes `operations` in order against the session's checkpoint.
    ///
    /// Positions advance only for confirmed steps. A permanent failure is
    /// recorded and the run continues; a missing checkpoint, cancellation,
    /// the run timeout or a failed session save stop it.
    #[instrument(skip_all, fields(operations = operations.len()))]
    pub async fn execute(
        &self,
        operations: &[ResolvedOperation],
        session: &mut SessionContext,
    ) -> ExecutionReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let start = session.state();
        let mut results = Vec::with_capacity(operations.len());
        let mut abort = None;

        info!(
            checkpoint_id = start.checkpoint_id,
            start_position = start.next_position,
            operations = operations.len(),
            persistent = session.is_persistent(),
            "Starting run"
        );

        for operation in operations {
            if self.cancel.is_cancelled() {
                abort = Some(Abort::new(AbortReason::Cancelled, "run cancelled", Some(operation.order)));
                break;
            }
            if let Some(limit) = self.config.run_timeout {
                if started.elapsed() >= limit {
                    abort = Some(Abort::new(
                        AbortReason::TimedOut,
                        format!("run exceeded {} ms", limit.as_millis()),
                        Some(operation.order),
                    ));
                    break;
                }
            }

            let sent = self.send(operation, session.state()).await;
            let succeeded = sent.result.outcome == Outcome::Succeeded;
            results.push(sent.result);

            if succeeded {
                if let Err(err) = session.advance().await {
                    error!(order = operation.order, "Step created but session could not be saved: {}", err);
                    abort = Some(Abort::new(
                        AbortReason::SessionPersistFailed,
                        format!("step {} was created but the session was not saved: {}", operation.order, err),
                        Some(operation.order),
                    ));
                    break;
                }
            }
            if let Some(fatal) = sent.abort {
                abort = Some(fatal);
                break;
            }
        }

        let skipped = operations.len() - results.len();
        let status = match &abort {
            Some(_) => RunStatus::Aborted,
            None if results.iter().any(|r| r.outcome != Outcome::Succeeded) => RunStatus::Partial,
            None => RunStatus::Complete,
        };
        let end = session.state();

        let report = ExecutionReport {
            status,
            checkpoint_id: start.checkpoint_id,
            start_position: start.next_position,
            next_position: end.next_position,
            timed_out: matches!(&abort, Some(a) if a.reason == AbortReason::TimedOut),
            abort,
            skipped,
            results,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            status = %report.status,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped,
            next_position = report.next_position,
            "Run finished"
        );
        report
    }

    async fn send(&self, operation: &ResolvedOperation, state: SessionState) -> Sent {
        let request = StepRequest {
            checkpoint_id: state.checkpoint_id,
            position: state.next_position,
            operation: operation.clone(),
        };
        let began = Instant::now();
        let record = |outcome, step_id, error, failure, attempts: u32| ExecutionResult {
            order: operation.order,
            position: request.position,
            kind: operation.kind,
            outcome,
            step_id,
            error,
            failure,
            latency_ms: began.elapsed().as_millis() as u64,
            retries: attempts.saturating_sub(1),
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            debug!(
                order = operation.order,
                position = request.position,
                attempt = attempts,
                "Sending {}",
                operation.kind
            );

            let reply = tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(order = operation.order, "Cancelled while the call was in flight");
                    return Sent {
                        result: record(Outcome::Unknown, None, None, None, attempts),
                        abort: Some(Abort::new(
                            AbortReason::Cancelled,
                            "cancelled while a call was in flight",
                            Some(operation.order),
                        )),
                    };
                }
                reply = tokio::time::timeout(self.config.call_timeout, self.service.create_step(&request)) => {
                    reply.unwrap_or_else(|_| {
                        RemoteReply::timeout(format!(
                            "no reply within {} ms",
                            self.config.call_timeout.as_millis()
                        ))
                    })
                }
            };

            let normalized = normalize(&reply);
            let Some(class) = classify(&normalized) else {
                info!(
                    order = operation.order,
                    position = request.position,
                    step_id = normalized.id.as_deref().unwrap_or("-"),
                    "Step created"
                );
                return Sent {
                    result: record(Outcome::Succeeded, normalized.id, None, None, attempts),
                    abort: None,
                };
            };

            if self.config.retry.should_retry(attempts, class) {
                let delay = self.config.retry.delay(attempts, normalized.retry_after_seconds);
                warn!(
                    order = operation.order,
                    attempt = attempts,
                    error_kind = normalized.error_kind.map(|k| k.as_str()).unwrap_or("-"),
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Sent {
                            result: record(Outcome::Unknown, None, Some(normalized), Some(class), attempts),
                            abort: Some(Abort::new(
                                AbortReason::Cancelled,
                                "cancelled while waiting to retry",
                                Some(operation.order),
                            )),
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            let message = normalized
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            let abort = match class {
                FailureClass::ResourceMissing => {
                    error!(
                        order = operation.order,
                        checkpoint_id = request.checkpoint_id,
                        "Checkpoint not found, aborting run: {}",
                        message
                    );
                    Some(Abort::new(
                        AbortReason::ResourceMissing,
                        format!("checkpoint {}: {}", request.checkpoint_id, message),
                        Some(operation.order),
                    ))
                }
                _ => {
                    warn!(
                        order = operation.order,
                        class = %class,
                        attempts = attempts,
                        "Operation failed: {}",
                        message
                    );
                    None
                }
            };
            return Sent {
                result: record(Outcome::Failed, None, Some(normalized), Some(class), attempts),
                abort,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{ErrorKind, RawResponse};
    use crate::session::memory::MemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use stepline_dsl::{compile_source, Overrides};

    /// Replies from a script, then succeeds with the position as id.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<RemoteReply>>,
        positions: Mutex<Vec<u32>>,
        latency: Option<Duration>,
    }

    impl Scripted {
        fn new(replies: Vec<RemoteReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            })
        }

        fn slow(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency: Some(latency),
                ..Self::default()
            })
        }

        fn positions(&self) -> Vec<u32> {
            self.positions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepService for Scripted {
        async fn create_step(&self, request: &StepRequest) -> RemoteReply {
            self.positions.lock().unwrap().push(request.position);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let scripted = self.replies.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| RemoteReply::json(200, json!({"id": request.position * 100})))
        }
    }

    fn clicks(n: usize) -> Vec<ResolvedOperation> {
        let yaml = format!("test: clicks\ndo:\n  - loop: {{ times: {}, do: [ {{ c: '#go' }} ] }}\n", n);
        compile_source(&yaml, &Overrides::new()).unwrap().operations
    }

    fn executor(service: Arc<Scripted>) -> Executor {
        let config = ExecutorConfig {
            retry: RetryPolicy::default().without_jitter(),
            ..ExecutorConfig::default()
        };
        Executor::new(service, config)
    }

    #[tokio::test]
    async fn all_steps_succeed() {
        let service = Scripted::new(vec![]);
        let mut session = SessionContext::detached(SessionState::new(5, 3));
        let report = executor(service.clone()).execute(&clicks(3), &mut session).await;

        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.start_position, 3);
        assert_eq!(report.next_position, 6);
        assert_eq!(service.positions(), vec![3, 4, 5]);
        assert_eq!(report.results[2].step_id.as_deref(), Some("500"));
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn permanent_failure_does_not_advance() {
        let service = Scripted::new(vec![
            RemoteReply::json(200, json!({"id": 1})),
            RemoteReply::json(400, json!({"error": "bad selector"})),
        ]);
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = executor(service.clone()).execute(&clicks(3), &mut session).await;

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.next_position, 3);
        assert_eq!(service.positions(), vec![1, 2, 2]);

        let failed = &report.results[1];
        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.failure, Some(FailureClass::Permanent));
        assert_eq!(failed.retries, 0);
        assert_eq!(
            failed.error.as_ref().and_then(|e| e.error_message.as_deref()),
            Some("bad selector")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_for_retry_after() {
        let service = Scripted::new(vec![RemoteReply::json(429, json!({"retryAfter": 5}))]);
        let mut session = SessionContext::detached(SessionState::start(5));
        let began = Instant::now();
        let report = executor(service.clone()).execute(&clicks(1), &mut session).await;

        assert!(began.elapsed() >= Duration::from_secs(5));
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.results[0].retries, 1);
        assert_eq!(service.positions(), vec![1, 1]);
        assert_eq!(report.next_position, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_failures() {
        let service = Scripted::new(vec![
            RemoteReply::json(503, json!({})),
            RemoteReply::json(503, json!({})),
            RemoteReply::json(503, json!({})),
        ]);
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = executor(service.clone()).execute(&clicks(2), &mut session).await;

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.results[0].retries, 2);
        assert_eq!(report.results[0].failure, Some(FailureClass::Transient));
        assert_eq!(report.results[1].outcome, Outcome::Succeeded);
        assert_eq!(report.next_position, 2);
    }

    #[tokio::test]
    async fn missing_checkpoint_aborts() {
        let service = Scripted::new(vec![
            RemoteReply::json(200, json!({"id": 1})),
            RemoteReply::json(404, json!({"message": "checkpoint not found"})),
        ]);
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = executor(service.clone()).execute(&clicks(4), &mut session).await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.abort.as_ref().map(|a| a.reason), Some(AbortReason::ResourceMissing));
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(service.positions().len(), 2);
        assert!(!report.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_is_a_transient_failure() {
        let service = Scripted::slow(Duration::from_secs(60));
        let config = ExecutorConfig {
            call_timeout: Duration::from_secs(2),
            retry: RetryPolicy::no_retry(),
            ..ExecutorConfig::default()
        };
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = Executor::new(service, config).execute(&clicks(1), &mut session).await;

        let result = &report.results[0];
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.error.as_ref().and_then(|e| e.error_kind), Some(ErrorKind::Timeout));
        assert_eq!(result.failure, Some(FailureClass::Transient));
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_is_checked_between_operations() {
        let service = Scripted::slow(Duration::from_secs(2));
        let config = ExecutorConfig {
            run_timeout: Some(Duration::from_secs(3)),
            ..ExecutorConfig::default()
        };
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = Executor::new(service, config).execute(&clicks(5), &mut session).await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.timed_out);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.next_position, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_in_flight_step_unknown() {
        let service = Scripted::slow(Duration::from_secs(10));
        let executor = executor(service);
        let token = executor.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let mut session = SessionContext::detached(SessionState::start(5));
        let report = executor.execute(&clicks(3), &mut session).await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.abort.as_ref().map(|a| a.reason), Some(AbortReason::Cancelled));
        assert_eq!(report.results[0].outcome, Outcome::Unknown);
        assert_eq!(report.next_position, 1);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn failed_save_aborts_the_run() {
        let store = Arc::new(MemorySessionStore::with_state(SessionState::start(5)));
        store.set_fail_saves(true);
        let mut session = SessionContext::resume(store.clone()).await.unwrap();
        let report = executor(Scripted::new(vec![])).execute(&clicks(2), &mut session).await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(
            report.abort.as_ref().map(|a| a.reason),
            Some(AbortReason::SessionPersistFailed)
        );
        assert_eq!(report.results[0].outcome, Outcome::Succeeded);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.current(), Some(SessionState::start(5)));
    }

    #[tokio::test]
    async fn unrecognized_success_body_is_permanent() {
        let service = Scripted::new(vec![RemoteReply::Response(RawResponse::new(200, "{\"weird\":1}"))]);
        let mut session = SessionContext::detached(SessionState::start(5));
        let report = executor(service).execute(&clicks(1), &mut session).await;

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(
            report.results[0].error.as_ref().and_then(|e| e.error_kind),
            Some(ErrorKind::UnrecognizedResponse)
        );
    }
}
