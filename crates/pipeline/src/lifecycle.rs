//! Lifecycle reporter: the single chokepoint for job state changes.
//!
//! Every transition is persisted first (a status-guarded update that also
//! appends the ledger entry) and then published through the
//! [`BroadcastService`]. A guard miss means another writer got there
//! first; it is reported as a conflict and nothing is published.

use std::sync::Arc;

use bigshot_core::error::CoreError;
use bigshot_core::job_events::UpdateType;
use bigshot_core::job_result::{JobOutcome, NotificationEntry};
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::progress::{next_progress, PROGRESS_COMPLETE};
use bigshot_core::types::DbId;
use bigshot_db::models::job::{CreateJob, Job, JobChanges};
use bigshot_db::store::JobStore;
use bigshot_events::{BroadcastService, JobUpdate};

use crate::error::PipelineError;

/// `error_message` of a job cancelled through the API.
pub const CANCELLED_BY_USER: &str = "Job cancelled by user";

#[derive(Clone)]
pub struct LifecycleReporter {
    jobs: Arc<dyn JobStore>,
    broadcast: BroadcastService,
}

impl LifecycleReporter {
    pub fn new(jobs: Arc<dyn JobStore>, broadcast: BroadcastService) -> Self {
        Self { jobs, broadcast }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Persist a new `pending` job. No event is published until it starts.
    pub async fn create(
        &self,
        job_type: JobType,
        target: Option<String>,
    ) -> Result<Job, PipelineError> {
        let job = self.jobs.create(&CreateJob { job_type, target }).await?;
        tracing::info!(job_id = job.id, job_type = %job.job_type, "Job created");
        Ok(job)
    }

    /// Store the queue correlation id in the result envelope.
    pub async fn record_task_id(&self, job_id: DbId, task_id: &str) -> Result<Job, PipelineError> {
        self.jobs
            .update(job_id, &JobChanges::default().task_id(task_id))
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    /// Move a job to `running`. A job that is already running is returned
    /// unchanged without publishing.
    pub async fn start(&self, job_id: DbId) -> Result<Job, PipelineError> {
        let current = self.load(job_id).await?;
        if current.status == JobStatus::Running {
            return Ok(current);
        }

        let changes = JobChanges::transition(JobStatus::Running).notify(NotificationEntry::new(
            UpdateType::Started,
            serde_json::json!({ "message": format!("Job {job_id} started processing") }),
        ));
        let job = self.apply(job_id, JobStatus::Running, &changes).await?;
        self.publish(UpdateType::Started, &job, &serde_json::Value::Null)
            .await;
        Ok(job)
    }

    /// Record progress of a running job. `percent` is clamped to `0..=100`
    /// and never lowers the stored value. `meta` keys are published as
    /// extra event fields.
    pub async fn report_progress(
        &self,
        job_id: DbId,
        percent: i16,
        meta: serde_json::Value,
    ) -> Result<Job, PipelineError> {
        let current = self.load(job_id).await?;
        if current.status != JobStatus::Running {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {}; progress can only be reported while running",
                current.status
            ))
            .into());
        }

        let progress = next_progress(current.progress, percent);
        let changes = JobChanges::default()
            .progress(progress)
            .when_status_in(&[JobStatus::Running]);
        let job = self.apply(job_id, JobStatus::Running, &changes).await?;
        self.publish(UpdateType::Progress, &job, &meta).await;
        Ok(job)
    }

    /// Finish a running job with its outcome.
    pub async fn complete(&self, job_id: DbId, outcome: JobOutcome) -> Result<Job, PipelineError> {
        let summary = outcome_summary(&outcome);
        let changes = JobChanges::transition(JobStatus::Completed)
            .progress(PROGRESS_COMPLETE)
            .outcome(outcome)
            .notify(NotificationEntry::new(UpdateType::Completed, summary.clone()));
        let job = self.apply(job_id, JobStatus::Completed, &changes).await?;
        tracing::info!(job_id, "Job completed");
        self.publish(UpdateType::Completed, &job, &summary).await;
        Ok(job)
    }

    /// Fail a pending or running job.
    pub async fn fail(&self, job_id: DbId, error: &str) -> Result<Job, PipelineError> {
        let details = serde_json::json!({ "error": error });
        let changes = JobChanges::transition(JobStatus::Failed)
            .error_message(error)
            .notify(NotificationEntry::new(UpdateType::Failed, details.clone()));
        let job = self.apply(job_id, JobStatus::Failed, &changes).await?;
        tracing::warn!(job_id, error, "Job failed");
        self.publish(UpdateType::Failed, &job, &details).await;
        Ok(job)
    }

    /// Cancel a pending or running job.
    pub async fn cancel(&self, job_id: DbId) -> Result<Job, PipelineError> {
        let details = serde_json::json!({ "message": CANCELLED_BY_USER });
        let changes = JobChanges::transition(JobStatus::Cancelled)
            .error_message(CANCELLED_BY_USER)
            .notify(NotificationEntry::new(UpdateType::Cancelled, details.clone()));
        let job = self.apply(job_id, JobStatus::Cancelled, &changes).await?;
        tracing::info!(job_id, "Job cancelled");
        self.publish(UpdateType::Cancelled, &job, &details).await;
        Ok(job)
    }

    async fn load(&self, job_id: DbId) -> Result<Job, PipelineError> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    /// Run a guarded update, turning a guard miss into `NotFound` or
    /// `Conflict` depending on whether the job exists.
    async fn apply(
        &self,
        job_id: DbId,
        to: JobStatus,
        changes: &JobChanges,
    ) -> Result<Job, PipelineError> {
        if let Some(job) = self.jobs.update(job_id, changes).await? {
            return Ok(job);
        }
        let current = self.load(job_id).await?;
        Err(CoreError::Conflict(format!(
            "Job {job_id} is {}; cannot move to {to}",
            current.status
        ))
        .into())
    }

    async fn publish(&self, update_type: UpdateType, job: &Job, details: &serde_json::Value) {
        let update = JobUpdate::new(
            update_type,
            job.id,
            job.job_type,
            job.target.clone(),
            job.status,
            job.progress,
        )
        .with_details(details);
        self.broadcast.publish(&update).await;
    }
}

fn not_found(job_id: DbId) -> PipelineError {
    CoreError::NotFound {
        entity: "job",
        id: job_id,
    }
    .into()
}

/// Small summary of an outcome for the ledger and the completion event.
fn outcome_summary(outcome: &JobOutcome) -> serde_json::Value {
    match outcome {
        JobOutcome::Enumeration(r) => serde_json::json!({
            "total_found": r.total_found,
            "new_domains": r.new_domains,
            "updated_domains": r.updated_domains,
        }),
        JobOutcome::Normalization(r) => serde_json::json!({
            "total_processed": r.total_processed,
            "normalized_count": r.normalized_count,
        }),
        JobOutcome::Deduplication(r) => serde_json::json!({
            "total_processed": r.total_processed,
            "merged_count": r.merged_count,
        }),
        JobOutcome::Cleanup(r) => serde_json::json!({
            "total_processed": r.total_processed,
            "deleted_count": r.deleted_count,
        }),
    }
}
