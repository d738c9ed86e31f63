//! Task dispatcher: creates the job row and hands the work to the queue.

use std::sync::Arc;

use bigshot_core::work::TaskPayload;
use bigshot_db::models::job::Job;

use crate::error::PipelineError;
use crate::lifecycle::LifecycleReporter;
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct TaskDispatcher {
    reporter: LifecycleReporter,
    queue: Arc<dyn TaskQueue>,
}

impl TaskDispatcher {
    pub fn new(reporter: LifecycleReporter, queue: Arc<dyn TaskQueue>) -> Self {
        Self { reporter, queue }
    }

    /// Validate `payload`, persist a `pending` job and submit its task.
    ///
    /// When the queue rejects the task the job is moved to `failed` and the
    /// queue error is returned, so no job is left pending without a task.
    pub async fn dispatch(&self, payload: TaskPayload) -> Result<Job, PipelineError> {
        payload.validate()?;

        let job = self
            .reporter
            .create(payload.job_type(), payload.target_summary())
            .await?;

        let task_id = match self.queue.submit(job.id, &payload).await {
            Ok(task_id) => task_id,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Failed to queue task");
                let message = format!("Failed to queue task: {e}");
                if let Err(fail_err) = self.reporter.fail(job.id, &message).await {
                    tracing::error!(
                        job_id = job.id,
                        error = %fail_err,
                        "Failed to mark unqueued job as failed",
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(job_id = job.id, task_id = %task_id, "Task queued");
        self.reporter.record_task_id(job.id, &task_id).await
    }
}
