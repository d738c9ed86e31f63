//! Typed job result payload.
//!
//! Every job stores one [`JobResult`] envelope: the queue correlation id,
//! the append-only notification ledger, and an [`JobOutcome`] variant per
//! job type once the job has produced one. The envelope is persisted as
//! JSON; [`JobResult::from_stored`] never fails so a corrupt payload reads
//! back as an empty result.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::job_events::UpdateType;
use crate::types::Timestamp;

/// Maximum number of discovered domains kept inline in a result.
pub const MAX_DOMAINS_IN_RESULT: usize = 100;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The common envelope stored in `jobs.result`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Correlation id of the queue task executing the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Per-type outcome, present once the job completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,

    #[serde(default)]
    pub notifications: NotificationLedger,
}

impl JobResult {
    /// Decode a stored payload, treating a missing or malformed value as
    /// an empty result.
    pub fn from_stored(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
            None => Self::default(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-job-type outcome summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Enumeration(EnumerationResult),
    Normalization(NormalizationResult),
    Deduplication(DeduplicationResult),
    Cleanup(CleanupResult),
}

/// A subdomain found while enumerating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDomain {
    pub subdomain: String,
    pub source: String,
    pub root_domain: String,
    /// `true` when the row already existed and was only refreshed.
    #[serde(default)]
    pub existing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumerationResult {
    pub total_found: usize,
    pub new_domains: usize,
    pub updated_domains: usize,
    #[serde(default)]
    pub failed_items: usize,
    #[serde(default)]
    pub skipped_items: usize,
    /// First [`MAX_DOMAINS_IN_RESULT`] discovered domains.
    #[serde(default)]
    pub domains_found: Vec<DiscoveredDomain>,
}

impl EnumerationResult {
    /// Record a batch of discoveries, keeping the inline sample bounded.
    pub fn record(&mut self, found: Vec<DiscoveredDomain>) {
        for domain in found {
            self.total_found += 1;
            if domain.existing {
                self.updated_domains += 1;
            } else {
                self.new_domains += 1;
            }
            if self.domains_found.len() < MAX_DOMAINS_IN_RESULT {
                self.domains_found.push(domain);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub total_processed: usize,
    pub normalized_count: usize,
    pub completion_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationResult {
    pub total_processed: usize,
    pub merged_count: usize,
    pub completion_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub total_processed: usize,
    pub deleted_count: usize,
    pub cutoff_date: Timestamp,
    pub completion_time: Timestamp,
}

// ---------------------------------------------------------------------------
// Notification ledger
// ---------------------------------------------------------------------------

/// One lifecycle event recorded against a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    #[serde(rename = "type")]
    pub notification_type: UpdateType,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl NotificationEntry {
    pub fn new(notification_type: UpdateType, details: serde_json::Value) -> Self {
        Self {
            notification_type,
            timestamp: Utc::now(),
            details,
        }
    }
}

/// Append-only history of lifecycle events.
///
/// Entries can only be appended through [`NotificationLedger::append`];
/// the one exception is [`NotificationLedger::prune_before`], reserved for
/// the retention routine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationLedger(Vec<NotificationEntry>);

impl NotificationLedger {
    pub fn append(&mut self, entry: NotificationEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[NotificationEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop entries recorded before `cutoff`. Returns how many were removed.
    pub fn prune_before(&mut self, cutoff: Timestamp) -> usize {
        let before = self.0.len();
        self.0.retain(|entry| entry.timestamp >= cutoff);
        before - self.0.len()
    }
}
