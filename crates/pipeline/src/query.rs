//! Read-side job queries: detail, status, logs, results and statistics.

use std::sync::Arc;

use bigshot_core::error::CoreError;
use bigshot_core::job_events::UpdateType;
use bigshot_core::job_result::{EnumerationResult, JobOutcome};
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::progress::estimate_completion;
use bigshot_core::task_state::TaskState;
use bigshot_core::types::{DbId, Timestamp};
use bigshot_db::models::job::{Job, JobListQuery, JobPage, JobStats};
use bigshot_db::store::JobStore;
use bigshot_events::ActiveJobSummary;
use chrono::Utc;
use serde::Serialize;

use crate::error::PipelineError;
use crate::queue::TaskQueue;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Live queue-side view of a job's task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusView {
    pub task_id: String,
    /// `None` when the queue no longer knows the task.
    pub state: Option<TaskState>,
    pub ready: bool,
    pub successful: bool,
    pub failed: bool,
}

impl TaskStatusView {
    fn new(task_id: String, state: Option<TaskState>) -> Self {
        Self {
            task_id,
            ready: state.is_some_and(TaskState::is_ready),
            successful: state == Some(TaskState::Succeeded),
            failed: state == Some(TaskState::Failed),
            state,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    #[serde(flatten)]
    pub job: Job,
    pub task_status: Option<TaskStatusView>,
    pub estimated_completion: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    fn new(timestamp: Timestamp, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobLogs {
    pub job_id: DbId,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResults {
    pub job_id: DbId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target: Option<String>,
    pub outcome: Option<JobOutcome>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobQueryService {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
}

impl JobQueryService {
    pub fn new(jobs: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { jobs, queue }
    }

    pub async fn get_job(&self, job_id: DbId) -> Result<Job, PipelineError> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "job",
                    id: job_id,
                }
                .into()
            })
    }

    pub async fn list(&self, params: &JobListQuery) -> Result<JobPage, PipelineError> {
        Ok(self.jobs.list(params).await?)
    }

    /// The job with its live task state and an estimated completion time.
    ///
    /// Queue errors degrade to a missing task status.
    pub async fn status(&self, job_id: DbId) -> Result<JobStatusView, PipelineError> {
        let job = self.get_job(job_id).await?;
        let task_status = match job.task_id() {
            Some(task_id) => self.lookup_task(job_id, task_id).await,
            None => None,
        };
        let estimated_completion = estimate_completion(
            job.status,
            job.progress,
            job.created_at,
            job.updated_at,
            Utc::now(),
        );

        Ok(JobStatusView {
            job,
            task_status,
            estimated_completion,
        })
    }

    /// Raw queue state of the job's task. `NotFound` when no task id was
    /// ever recorded for the job.
    pub async fn task_status(&self, job_id: DbId) -> Result<TaskStatusView, PipelineError> {
        let job = self.get_job(job_id).await?;
        let task_id = job.task_id().ok_or_else(|| {
            CoreError::NotFound {
                entity: "task for job",
                id: job_id,
            }
        })?;
        let state = self.queue.state(&task_id).await?;
        Ok(TaskStatusView::new(task_id, state))
    }

    /// Log lines derived from the job's timestamps and notification ledger.
    pub async fn logs(&self, job_id: DbId) -> Result<JobLogs, PipelineError> {
        let job = self.get_job(job_id).await?;
        Ok(JobLogs {
            job_id,
            logs: synthesize_logs(&job),
        })
    }

    /// Outcome of a completed job.
    pub async fn results(&self, job_id: DbId) -> Result<JobResults, PipelineError> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {}; results are only available once completed",
                job.status
            ))
            .into());
        }

        let outcome = job.result_envelope().outcome.or_else(|| {
            (job.job_type == JobType::DomainEnumeration)
                .then(|| JobOutcome::Enumeration(EnumerationResult::default()))
        });
        Ok(JobResults {
            job_id,
            job_type: job.job_type,
            target: job.target,
            outcome,
        })
    }

    pub async fn stats(&self) -> Result<JobStats, PipelineError> {
        Ok(self.jobs.stats().await?)
    }

    pub async fn active_jobs(&self) -> Result<Vec<ActiveJobSummary>, PipelineError> {
        let jobs = self.jobs.list_active().await?;
        Ok(jobs
            .into_iter()
            .map(|job| ActiveJobSummary {
                id: job.id,
                job_type: job.job_type,
                target: job.target,
                status: job.status,
                progress: job.progress,
                created_at: job.created_at,
                updated_at: job.updated_at,
            })
            .collect())
    }

    async fn lookup_task(&self, job_id: DbId, task_id: String) -> Option<TaskStatusView> {
        match self.queue.state(&task_id).await {
            Ok(state) => Some(TaskStatusView::new(task_id, state)),
            Err(e) => {
                tracing::warn!(job_id, task_id = %task_id, error = %e, "Task state lookup failed");
                None
            }
        }
    }
}

fn synthesize_logs(job: &Job) -> Vec<LogEntry> {
    let scope = job.target.as_deref().unwrap_or("all domains");
    let mut logs = vec![LogEntry::new(
        job.created_at,
        LogLevel::Info,
        format!("Job created: {} for {scope}", job.job_type),
    )];

    let envelope = job.result_envelope();
    for entry in envelope.notifications.entries() {
        let detail = entry
            .details
            .get("message")
            .or_else(|| entry.details.get("error"))
            .and_then(serde_json::Value::as_str);
        let (level, message) = match entry.notification_type {
            UpdateType::Started => (LogLevel::Info, "Job started".to_string()),
            UpdateType::Progress => (LogLevel::Info, "Progress update".to_string()),
            UpdateType::Completed => (LogLevel::Info, "Job completed".to_string()),
            UpdateType::Failed => (
                LogLevel::Error,
                format!("Job failed: {}", detail.unwrap_or("unknown error")),
            ),
            UpdateType::Cancelled => (LogLevel::Warn, "Job cancelled".to_string()),
        };
        logs.push(LogEntry::new(entry.timestamp, level, message));
    }

    let already_logged = envelope
        .notifications
        .entries()
        .iter()
        .any(|entry| entry.notification_type.as_str() == job.status.as_str());
    if !already_logged {
        let line = match job.status {
            JobStatus::Pending => None,
            JobStatus::Running => Some((
                LogLevel::Info,
                format!("Job running: {}% complete", job.progress),
            )),
            JobStatus::Completed => Some((LogLevel::Info, "Job completed".to_string())),
            JobStatus::Failed => Some((
                LogLevel::Error,
                format!(
                    "Job failed: {}",
                    job.error_message.as_deref().unwrap_or("unknown error")
                ),
            )),
            JobStatus::Cancelled => Some((LogLevel::Warn, "Job cancelled".to_string())),
        };
        if let Some((level, message)) = line {
            logs.push(LogEntry::new(job.updated_at, level, message));
        }
    }

    logs
}
