//! Job lifecycle state machine.
//!
//! ```text
//! pending ──► running ──► completed
//!    │           ├──────► failed
//!    │           └──────► cancelled
//!    ├──────────────────► cancelled   (user-initiated)
//!    └──────────────────► failed      (dispatch could not enqueue the task)
//! ```
//!
//! Terminal states accept no further transition. Stores use
//! [`JobStatus::sources_for`] to guard writes so that the first terminal
//! write wins when a worker and a cancellation race on the same row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Background job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Statuses from which a job may still be cancelled.
pub const ACTIVE_STATUSES: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Running];

/// Statuses that accept no further mutation of status or progress.
pub const TERMINAL_STATUSES: [JobStatus; 3] = [
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// The lowercase name stored in the database and sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    pub fn is_active(self) -> bool {
        ACTIVE_STATUSES.contains(&self)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `running -> running` is accepted so that a redelivered task can call
    /// `start` again without failing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// All statuses from which `target` is reachable in one step.
    ///
    /// Used as the guard of a conditional update.
    pub fn sources_for(target: JobStatus) -> Vec<JobStatus> {
        JobStatus::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job status '{s}'")))
    }
}

/// Row decoding support (`#[sqlx(try_from = "String")]`).
impl TryFrom<String> for JobStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn user_cancellation_is_legal_from_active_states() {
        for status in ACTIVE_STATUSES {
            assert!(status.can_transition_to(JobStatus::Cancelled), "{status}");
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in TERMINAL_STATUSES {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn start_is_idempotent_but_pending_cannot_complete() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn sources_for_cancelled_are_the_active_states() {
        assert_eq!(
            JobStatus::sources_for(JobStatus::Cancelled),
            vec![JobStatus::Pending, JobStatus::Running]
        );
        assert_eq!(
            JobStatus::sources_for(JobStatus::Completed),
            vec![JobStatus::Running]
        );
    }

    #[test]
    fn parses_and_displays_lowercase_names() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert_eq!(
            serde_json::to_value(JobStatus::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
    }
}
