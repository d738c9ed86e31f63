//! Queue-side task state.
//!
//! A task is the queue's unit of execution for one job. Its state is owned
//! by the task queue and looked up on demand through the task id stored in
//! the job's result envelope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Revoked,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Queued,
        TaskState::Running,
        TaskState::Succeeded,
        TaskState::Failed,
        TaskState::Revoked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Revoked => "revoked",
        }
    }

    /// The task will not change state any more.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Revoked
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown task state '{s}'")))
    }
}

/// Row decoding support (`#[sqlx(try_from = "String")]`).
impl TryFrom<String> for TaskState {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness() {
        assert!(!TaskState::Queued.is_ready());
        assert!(!TaskState::Running.is_ready());
        assert!(TaskState::Revoked.is_ready());
        assert!(TaskState::Succeeded.is_ready());
    }

    #[test]
    fn parses_names() {
        assert_eq!("revoked".parse::<TaskState>().unwrap(), TaskState::Revoked);
        assert!("PROGRESS".parse::<TaskState>().is_err());
    }
}
