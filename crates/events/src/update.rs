//! The wire event published for every job lifecycle transition.

use bigshot_core::job_events::UpdateType;
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// `{ job_id, job_type, target, status, progress, update_type, timestamp, ...extra }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: DbId,
    pub job_type: JobType,
    pub target: Option<String>,
    pub status: JobStatus,
    pub progress: i16,
    pub update_type: UpdateType,
    pub timestamp: Timestamp,
    /// Event-specific fields, flattened into the top-level object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobUpdate {
    pub fn new(
        update_type: UpdateType,
        job_id: DbId,
        job_type: JobType,
        target: Option<String>,
        status: JobStatus,
        progress: i16,
    ) -> Self {
        Self {
            job_id,
            job_type,
            target,
            status,
            progress,
            update_type,
            timestamp: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    /// Merge every key of a JSON object into the extra fields. Non-object
    /// values are ignored.
    pub fn with_details(mut self, details: &serde_json::Value) -> Self {
        if let Some(map) = details.as_object() {
            for (key, value) in map {
                self.extra.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_fields_are_flattened() {
        let update = JobUpdate::new(
            UpdateType::Progress,
            7,
            JobType::DomainEnumeration,
            Some("a.com".into()),
            JobStatus::Running,
            50,
        )
        .with_details(&serde_json::json!({ "current_target": "a.com" }));

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["job_id"], 7);
        assert_eq!(value["update_type"], "progress");
        assert_eq!(value["job_type"], "domain_enumeration");
        assert_eq!(value["current_target"], "a.com");

        let back: JobUpdate = serde_json::from_value(value).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn payload_without_update_type_is_rejected() {
        let raw = serde_json::json!({
            "job_id": 1,
            "job_type": "data_cleanup",
            "target": null,
            "status": "running",
            "progress": 0,
            "timestamp": "2026-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<JobUpdate>(raw).is_err());
    }

    #[test]
    fn details_merge_ignores_non_objects() {
        let update = JobUpdate::new(
            UpdateType::Failed,
            1,
            JobType::DataCleanup,
            None,
            JobStatus::Failed,
            0,
        )
        .with_details(&serde_json::json!({"error": "boom"}))
        .with_details(&serde_json::json!(42));
        assert_eq!(update.extra.len(), 1);
        assert_eq!(update.extra["error"], "boom");
    }
}
