//! Names shared by the job update wire format and the real-time protocol.
//!
//! Used by the lifecycle reporter when publishing, by the broadcast
//! service when routing to rooms, and by the WebSocket handler.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Default pub/sub channel carrying job updates between processes.
pub const JOB_UPDATES_CHANNEL: &str = "job_updates";

/// Room every "all jobs" subscriber joins.
pub const ALL_JOBS_ROOM: &str = "all_jobs";

/// Room name for a single job.
pub fn job_room(job_id: DbId) -> String {
    format!("job_{job_id}")
}

/// What happened to a job, as carried in `update_type` and recorded in the
/// notification ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

impl UpdateType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateType::Started => "started",
            UpdateType::Progress => "progress",
            UpdateType::Completed => "completed",
            UpdateType::Failed => "failed",
            UpdateType::Cancelled => "cancelled",
        }
    }

    /// Whether this update is a lifecycle transition recorded in the
    /// ledger. Progress ticks are broadcast but not recorded.
    pub fn is_lifecycle(self) -> bool {
        !matches!(self, UpdateType::Progress)
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
