//! Runs independent definitions concurrently.
//!
//! Every job owns its session, so jobs share nothing but the executor's
//! read-only configuration and the step service.

use crate::executor::{ExecutionReport, Executor};
use crate::session::SessionContext;
use futures::stream::{self, StreamExt};
use stepline_dsl::ResolvedOperation;
use tracing::info;

/// One definition's compiled operations and where to write them.
pub struct BatchJob {
    pub name: String,
    pub operations: Vec<ResolvedOperation>,
    pub session: SessionContext,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub name: String,
    pub report: ExecutionReport,
}

/// Executes jobs with at most `workers` of them in flight.
pub struct BatchRunner<'a> {
    executor: &'a Executor,
    workers: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(executor: &'a Executor, workers: usize) -> Self {
        Self {
            executor,
            workers: workers.max(1),
        }
    }

    /// Runs every job. Outcomes come back in job order.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<BatchOutcome> {
        info!(jobs = jobs.len(), workers = self.workers, "Starting batch");
        let executor = self.executor;

        let mut outcomes: Vec<(usize, BatchOutcome)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| async move {
                let BatchJob {
                    name,
                    operations,
                    mut session,
                } = job;
                info!(job = %name, operations = operations.len(), "Batch job started");
                let report = executor.execute(&operations, &mut session).await;
                (index, BatchOutcome { name, report })
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
