//! Task execution.
//!
//! A [`Worker`] runs one claimed task end to end: start the job, walk the
//! work plan item by item, report progress after each item and finish the
//! job. Progress is only reported when the percentage moves. Cancellation
//! is observed between items by re-reading the job's status; a job that is
//! no longer `running` is never written to again.

use std::sync::Arc;

use bigshot_core::job_result::{EnumerationResult, JobOutcome};
use bigshot_core::job_status::JobStatus;
use bigshot_core::task_state::TaskState;
use bigshot_core::types::DbId;
use bigshot_core::work::{ItemOutcome, TaskPayload, WorkTally};
use bigshot_db::models::job::Job;
use bigshot_db::store::DomainStore;

use crate::error::PipelineError;
use crate::lifecycle::LifecycleReporter;
use crate::plan::{ItemContext, WorkItem, WorkPlan};
use crate::processor::{CredentialProvider, ProcessorRegistry};
use crate::queue::{QueueError, QueuedTask, TaskQueue};

/// How the execution of one task ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed(Job),
    Failed(String),
    /// The job was cancelled before or while it ran.
    Cancelled,
    /// The job was not runnable when the task was picked up.
    Skipped(String),
}

impl ExecutionOutcome {
    /// Final queue-side state of the task.
    pub fn task_state(&self) -> TaskState {
        match self {
            ExecutionOutcome::Completed(_) => TaskState::Succeeded,
            ExecutionOutcome::Failed(_) => TaskState::Failed,
            ExecutionOutcome::Cancelled | ExecutionOutcome::Skipped(_) => TaskState::Revoked,
        }
    }

    fn task_error(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Failed(error) | ExecutionOutcome::Skipped(error) => Some(error),
            _ => None,
        }
    }
}

enum RunEnd {
    Finished(JobOutcome),
    Stopped,
}

#[derive(Clone)]
pub struct Worker {
    name: String,
    reporter: LifecycleReporter,
    domains: Arc<dyn DomainStore>,
    processors: Arc<ProcessorRegistry>,
    credentials: Arc<dyn CredentialProvider>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        reporter: LifecycleReporter,
        domains: Arc<dyn DomainStore>,
        processors: Arc<ProcessorRegistry>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            reporter,
            domains,
            processors,
            credentials,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim the next task from `queue`, run it and record its final state.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub async fn run_next(
        &self,
        queue: &dyn TaskQueue,
    ) -> Result<Option<ExecutionOutcome>, QueueError> {
        let task = match queue.claim(&self.name).await {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(None),
            Err(QueueError::InvalidPayload {
                task_id,
                job_id,
                reason,
            }) => {
                tracing::error!(job_id, task_id = %task_id, reason = %reason, "Invalid payload");
                let message = format!("Invalid task payload: {reason}");
                if let Err(e) = self.reporter.fail(job_id, &message).await {
                    tracing::warn!(job_id, error = %e, "Could not fail job with invalid payload");
                }
                return Ok(Some(ExecutionOutcome::Failed(message)));
            }
            Err(e) => return Err(e),
        };

        let outcome = self.execute(&task).await;
        queue
            .finish(&task.id, outcome.task_state(), outcome.task_error())
            .await?;
        Ok(Some(outcome))
    }

    /// Run one task to completion.
    pub async fn execute(&self, task: &QueuedTask) -> ExecutionOutcome {
        let job_id = task.job_id;

        match self.reporter.start(job_id).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                tracing::info!(job_id, worker = %self.name, "Job not runnable, skipping");
                return ExecutionOutcome::Skipped(e.to_string());
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Could not start job");
                return ExecutionOutcome::Failed(e.to_string());
            }
        }
        tracing::info!(job_id, worker = %self.name, task_id = %task.id, "Job started");

        match self.run(job_id, &task.payload).await {
            Ok(RunEnd::Finished(outcome)) => match self.reporter.complete(job_id, outcome).await {
                Ok(job) => ExecutionOutcome::Completed(job),
                Err(e) if e.is_conflict() => {
                    tracing::info!(job_id, "Job stopped before completion, discarding");
                    ExecutionOutcome::Cancelled
                }
                Err(e) => self.fail(job_id, e).await,
            },
            Ok(RunEnd::Stopped) => {
                tracing::info!(job_id, "Job cancelled, stopping work");
                ExecutionOutcome::Cancelled
            }
            Err(e) => self.fail(job_id, e).await,
        }
    }

    async fn run(&self, job_id: DbId, payload: &TaskPayload) -> Result<RunEnd, PipelineError> {
        let plan = WorkPlan::build(payload, self.domains.as_ref()).await?;
        let ctx = ItemContext {
            domains: self.domains.as_ref(),
            processors: &self.processors,
            credentials: self.credentials.as_ref(),
        };
        let mut tally = WorkTally::new(plan.len());
        let mut found = EnumerationResult::default();
        let mut reported = 0;

        for item in plan.items() {
            if !self.still_running(job_id).await? {
                return Ok(RunEnd::Stopped);
            }

            let outcome = item.execute(&ctx, &mut found).await;
            match &outcome {
                ItemOutcome::Errored { error } => match item {
                    WorkItem::Enumerate(pair) => tracing::warn!(
                        job_id,
                        domain = %pair.target,
                        source = %pair.source,
                        error = %error,
                        "Enumeration pair failed",
                    ),
                    _ => tracing::warn!(job_id, item = %item, error = %error, "Work item failed"),
                },
                ItemOutcome::Skipped { reason } => {
                    tracing::debug!(job_id, item = %item, reason = %reason, "Work item skipped");
                }
                ItemOutcome::Succeeded { .. } => {}
            }
            tally.record(&outcome);

            let percent = tally.percent();
            if percent == reported {
                continue;
            }
            reported = percent;

            match self
                .reporter
                .report_progress(job_id, percent, item.progress_meta(&tally))
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_conflict() => return Ok(RunEnd::Stopped),
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(job_id, ?tally, "Work plan finished");
        Ok(RunEnd::Finished(plan.outcome(&tally, found)))
    }

    async fn still_running(&self, job_id: DbId) -> Result<bool, PipelineError> {
        let job = self.reporter.jobs().find_by_id(job_id).await?;
        Ok(matches!(job, Some(job) if job.status == JobStatus::Running))
    }

    /// Record a fatal error. Losing the race to a cancel is not a failure.
    async fn fail(&self, job_id: DbId, error: PipelineError) -> ExecutionOutcome {
        let message = error.to_string();
        match self.reporter.fail(job_id, &message).await {
            Ok(_) => ExecutionOutcome::Failed(message),
            Err(e) if e.is_conflict() => ExecutionOutcome::Cancelled,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Could not record job failure");
                ExecutionOutcome::Failed(message)
            }
        }
    }
}
