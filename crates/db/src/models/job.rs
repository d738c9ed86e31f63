//! Job row model and the DTOs used to create, update and list jobs.

use std::collections::BTreeMap;

use bigshot_core::job_result::{JobOutcome, JobResult, NotificationEntry};
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum page size for job listing.
pub const MAX_PER_PAGE: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_PER_PAGE: i64 = 50;

/// A row from the `jobs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub progress: i16,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// The typed result envelope. Malformed payloads read as empty.
    pub fn result_envelope(&self) -> JobResult {
        JobResult::from_stored(self.result.as_ref())
    }

    /// Correlation id of the queue task executing this job, if recorded.
    pub fn task_id(&self) -> Option<String> {
        self.result_envelope().task_id
    }
}

/// Input for creating a new job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub job_type: JobType,
    pub target: Option<String>,
}

/// A conditional, partial update of a job row.
///
/// Every field is optional. Result-envelope fields are merged into the
/// stored payload rather than replacing it, and `notification` is always
/// appended to the ledger. When `expected` is non-empty the update only
/// applies if the row's current status is one of those values.
#[derive(Debug, Clone, Default)]
pub struct JobChanges {
    pub status: Option<JobStatus>,
    pub progress: Option<i16>,
    pub error_message: Option<String>,
    pub task_id: Option<String>,
    pub outcome: Option<JobOutcome>,
    pub notification: Option<NotificationEntry>,
    pub expected: Vec<JobStatus>,
}

impl JobChanges {
    /// A status change guarded by the lifecycle's legal source states.
    pub fn transition(to: JobStatus) -> Self {
        Self {
            status: Some(to),
            expected: JobStatus::sources_for(to),
            ..Default::default()
        }
    }

    pub fn progress(mut self, progress: i16) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn outcome(mut self, outcome: JobOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn notify(mut self, entry: NotificationEntry) -> Self {
        self.notification = Some(entry);
        self
    }

    /// Only apply while the job is in one of `statuses`.
    pub fn when_status_in(mut self, statuses: &[JobStatus]) -> Self {
        self.expected = statuses.to_vec();
        self
    }

    /// Apply these changes to an in-memory job, honouring the guard.
    ///
    /// Returns `false` (leaving `job` untouched) when the guard rejects.
    pub fn apply_to(&self, job: &mut Job, now: Timestamp) -> bool {
        if !self.expected.is_empty() && !self.expected.contains(&job.status) {
            return false;
        }

        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(message) = &self.error_message {
            job.error_message = Some(message.clone());
        }

        if self.task_id.is_some() || self.outcome.is_some() || self.notification.is_some() {
            job.result = Some(self.merge_result(job.result.take()));
        }

        job.updated_at = now;
        true
    }

    /// Key-level merge into the stored `result` object, matching the
    /// `jsonb_set` chain of the Postgres update: a non-object result starts
    /// over as `{}`, a non-array `notifications` starts over as `[]`, and
    /// every other key is kept as stored.
    fn merge_result(&self, stored: Option<serde_json::Value>) -> serde_json::Value {
        let mut object = match stored {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(task_id) = &self.task_id {
            object.insert("task_id".into(), serde_json::Value::String(task_id.clone()));
        }
        if let Some(outcome) = &self.outcome {
            object.insert(
                "outcome".into(),
                serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null),
            );
        }
        if let Some(entry) = &self.notification {
            let entry = serde_json::to_value(entry).unwrap_or(serde_json::Value::Null);
            match object.get_mut("notifications") {
                Some(serde_json::Value::Array(entries)) => entries.push(entry),
                _ => {
                    object.insert("notifications".into(), serde_json::json!([entry]));
                }
            }
        }
        serde_json::Value::Object(object)
    }
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    #[serde(rename = "type")]
    pub job_type: Option<JobType>,
    /// Substring match against the job target.
    pub target: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl JobListQuery {
    /// Effective `(page, per_page)` with defaults and bounds applied.
    pub fn paging(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }

    /// Whether `job` passes the filters (used by in-memory stores).
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type == t)
            && self.target.as_deref().is_none_or(|needle| {
                let needle = needle.to_lowercase();
                job.target
                    .as_deref()
                    .is_some_and(|target| target.to_lowercase().contains(&needle))
            })
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

impl JobPage {
    pub fn new(items: Vec<Job>, total: i64, page: i64, per_page: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            total,
            page,
            per_page,
            pages,
        }
    }
}

/// Aggregate job counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub total_jobs: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    /// Mean `updated_at - created_at` of completed jobs, in seconds.
    pub avg_completion_secs: Option<f64>,
    /// Jobs created in the last 24 hours.
    pub recent_jobs: i64,
}

#[cfg(test)]
mod tests {
    use bigshot_core::job_events::UpdateType;
    use chrono::Utc;

    use super::*;

    fn job(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: 1,
            job_type: JobType::DomainEnumeration,
            target: Some("example.com".into()),
            status,
            progress: 0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn guarded_change_is_rejected_from_wrong_status() {
        let mut j = job(JobStatus::Completed);
        let applied = JobChanges::transition(JobStatus::Cancelled).apply_to(&mut j, Utc::now());
        assert!(!applied);
        assert_eq!(j.status, JobStatus::Completed);
    }

    #[test]
    fn envelope_fields_merge_into_existing_result() {
        let mut j = job(JobStatus::Pending);
        JobChanges::default()
            .task_id("t-1")
            .apply_to(&mut j, Utc::now());
        JobChanges::transition(JobStatus::Running)
            .notify(NotificationEntry::new(
                UpdateType::Started,
                serde_json::Value::Null,
            ))
            .apply_to(&mut j, Utc::now());

        let envelope = j.result_envelope();
        assert_eq!(envelope.task_id.as_deref(), Some("t-1"));
        assert_eq!(envelope.notifications.len(), 1);
        assert_eq!(j.status, JobStatus::Running);
    }

    #[test]
    fn paging_is_bounded() {
        let q = JobListQuery {
            page: Some(0),
            per_page: Some(1_000),
            ..Default::default()
        };
        assert_eq!(q.paging(), (1, MAX_PER_PAGE));
        assert_eq!(JobListQuery::default().paging(), (1, DEFAULT_PER_PAGE));
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(JobPage::new(vec![], 101, 1, 50).pages, 3);
        assert_eq!(JobPage::new(vec![], 0, 1, 50).pages, 0);
    }

    #[test]
    fn filters_match_target_substring() {
        let q = JobListQuery {
            target: Some("example".into()),
            status: Some(JobStatus::Pending),
            ..Default::default()
        };
        assert!(q.matches(&job(JobStatus::Pending)));
        assert!(!q.matches(&job(JobStatus::Running)));
    }

    #[test]
    fn target_filter_ignores_case() {
        let q = JobListQuery {
            target: Some("EXAMPLE.Com".into()),
            ..Default::default()
        };
        assert!(q.matches(&job(JobStatus::Pending)));
    }

    #[test]
    fn ledger_append_keeps_keys_of_a_malformed_envelope() {
        let mut j = job(JobStatus::Running);
        j.result = Some(serde_json::json!({
            "task_id": 42,
            "legacy": "kept",
            "notifications": "not-a-list",
        }));
        JobChanges::default()
            .notify(NotificationEntry::new(
                UpdateType::Progress,
                serde_json::Value::Null,
            ))
            .apply_to(&mut j, Utc::now());

        let stored = j.result.as_ref().unwrap();
        assert_eq!(stored["task_id"], 42);
        assert_eq!(stored["legacy"], "kept");
        assert_eq!(stored["notifications"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn non_object_result_starts_over() {
        let mut j = job(JobStatus::Pending);
        j.result = Some(serde_json::json!("garbage"));
        JobChanges::default()
            .task_id("t-9")
            .apply_to(&mut j, Utc::now());
        assert_eq!(j.result, Some(serde_json::json!({ "task_id": "t-9" })));
    }
}
