//! Task queue row model.

use bigshot_core::task_state::TaskState;
use bigshot_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: DbId,
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub state: TaskState,
    pub worker: Option<String>,
    pub error: Option<String>,
    pub enqueued_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// What happened when a revoke was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The task was queued or running and is now revoked.
    Revoked,
    /// The task had already finished; nothing to do.
    AlreadyFinished(TaskState),
    /// No task with that id exists.
    Unknown,
}
