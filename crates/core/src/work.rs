//! Work model: what a task carries and how its items are tallied.
//!
//! A task is a finite, ordered sequence of work items processed one after
//! another. Each item ends in exactly one [`ItemOutcome`]; a failing item
//! never aborts the sequence.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_type::JobType;

/// Default retention window of the cleanup job.
pub const DEFAULT_CLEANUP_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// Task payload
// ---------------------------------------------------------------------------

/// The parameters a queued task needs to rebuild its work plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    DomainEnumeration {
        targets: Vec<String>,
        sources: Vec<String>,
        #[serde(default)]
        options: serde_json::Value,
    },
    DataNormalization,
    DataDeduplication,
    DataCleanup {
        days_old: u32,
    },
}

impl TaskPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            TaskPayload::DomainEnumeration { .. } => JobType::DomainEnumeration,
            TaskPayload::DataNormalization => JobType::DataNormalization,
            TaskPayload::DataDeduplication => JobType::DataDeduplication,
            TaskPayload::DataCleanup { .. } => JobType::DataCleanup,
        }
    }

    /// Human-readable summary stored as the job's `target`.
    pub fn target_summary(&self) -> Option<String> {
        match self {
            TaskPayload::DomainEnumeration { targets, .. } => Some(targets.join(",")),
            _ => None,
        }
    }

    /// Reject payloads that cannot produce a meaningful plan.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let TaskPayload::DomainEnumeration { targets, sources, .. } = self {
            if targets.is_empty() {
                return Err(CoreError::Validation(
                    "At least one target domain is required".to_string(),
                ));
            }
            if sources.is_empty() {
                return Err(CoreError::Validation(
                    "At least one source is required".to_string(),
                ));
            }
            for target in targets {
                crate::domain_names::validate_target(target)?;
            }
        }
        Ok(())
    }

    /// The (target, source) pairs of an enumeration, target-major.
    pub fn enumeration_pairs(&self) -> Vec<EnumerationPair> {
        match self {
            TaskPayload::DomainEnumeration { targets, sources, .. } => targets
                .iter()
                .flat_map(|target| {
                    sources.iter().map(move |source| EnumerationPair {
                        target: target.clone(),
                        source: source.clone(),
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One unit of enumeration work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationPair {
    pub target: String,
    pub source: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a single work item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Processed; `affected` counts rows found or changed by the item.
    Succeeded { affected: usize },
    /// Nothing to do for this item (e.g. unsupported source).
    Skipped { reason: String },
    /// The item failed; the sequence continues.
    Errored { error: String },
}

/// Running totals over a work sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkTally {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub errored: usize,
    pub affected: usize,
}

impl WorkTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded { affected } => {
                self.succeeded += 1;
                self.affected += affected;
            }
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Errored { .. } => self.errored += 1,
        }
    }

    /// Items finished so far, whatever their outcome.
    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.errored
    }

    pub fn percent(&self) -> i16 {
        crate::progress::percent_complete(self.processed(), self.total)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn enumeration(targets: &[&str], sources: &[&str]) -> TaskPayload {
        TaskPayload::DomainEnumeration {
            targets: targets.iter().map(|s| s.to_string()).collect(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            options: serde_json::Value::Null,
        }
    }

    #[test]
    fn pairs_are_target_major() {
        let payload = enumeration(&["a.com", "b.com"], &["x", "y"]);
        let pairs: Vec<_> = payload
            .enumeration_pairs()
            .into_iter()
            .map(|p| format!("{}/{}", p.target, p.source))
            .collect();
        assert_eq!(pairs, ["a.com/x", "a.com/y", "b.com/x", "b.com/y"]);
    }

    #[test]
    fn empty_targets_or_sources_are_rejected() {
        assert_matches!(
            enumeration(&[], &["x"]).validate(),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            enumeration(&["a.com"], &[]).validate(),
            Err(CoreError::Validation(_))
        );
        assert!(enumeration(&["a.com"], &["x"]).validate().is_ok());
    }

    #[test]
    fn target_summary_joins_targets() {
        let payload = enumeration(&["a.com", "b.com"], &["x"]);
        assert_eq!(payload.target_summary().as_deref(), Some("a.com,b.com"));
        assert_eq!(TaskPayload::DataNormalization.target_summary(), None);
    }

    #[test]
    fn payload_is_tagged_by_type() {
        let json = serde_json::to_value(TaskPayload::DataCleanup { days_old: 30 }).unwrap();
        assert_eq!(json["type"], "data_cleanup");
        assert_eq!(json["days_old"], 30);
        assert_eq!(
            TaskPayload::DataCleanup { days_old: 30 }.job_type(),
            JobType::DataCleanup
        );
    }

    #[test]
    fn tally_counts_every_outcome_as_processed() {
        let mut tally = WorkTally::new(4);
        tally.record(&ItemOutcome::Succeeded { affected: 3 });
        tally.record(&ItemOutcome::Errored {
            error: "boom".into(),
        });
        tally.record(&ItemOutcome::Skipped {
            reason: "unsupported".into(),
        });
        assert_eq!(tally.processed(), 3);
        assert_eq!(tally.affected, 3);
        assert_eq!(tally.percent(), 75);
    }
}
