//! Job cancellation.

use std::sync::Arc;

use bigshot_core::error::CoreError;
use bigshot_core::types::DbId;
use bigshot_db::models::job::Job;
use bigshot_db::models::task::RevokeOutcome;

use crate::error::PipelineError;
use crate::lifecycle::LifecycleReporter;
use crate::queue::TaskQueue;

/// Cancels pending or running jobs.
///
/// The queue revoke is best effort: an unknown, finished or unreachable
/// task does not block the cancel. The job row is the authority, and the
/// worker stops at its next status check.
#[derive(Clone)]
pub struct CancellationController {
    reporter: LifecycleReporter,
    queue: Arc<dyn TaskQueue>,
}

impl CancellationController {
    pub fn new(reporter: LifecycleReporter, queue: Arc<dyn TaskQueue>) -> Self {
        Self { reporter, queue }
    }

    pub async fn cancel(&self, job_id: DbId) -> Result<Job, PipelineError> {
        let job = self
            .reporter
            .jobs()
            .find_by_id(job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "job",
                id: job_id,
            })?;

        if !job.status.is_active() {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {} and cannot be cancelled",
                job.status
            ))
            .into());
        }

        if let Some(task_id) = job.task_id() {
            match self.queue.revoke(&task_id).await {
                Ok(RevokeOutcome::Revoked) => {
                    tracing::info!(job_id, task_id = %task_id, "Task revoked");
                }
                Ok(outcome) => {
                    tracing::debug!(job_id, task_id = %task_id, ?outcome, "Nothing to revoke");
                }
                Err(e) => {
                    tracing::warn!(job_id, task_id = %task_id, error = %e, "Failed to revoke task");
                }
            }
        }

        self.reporter.cancel(job_id).await
    }
}
