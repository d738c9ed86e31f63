//! Repository for the `tasks` queue table.

use bigshot_core::task_state::TaskState;
use bigshot_core::types::DbId;
use bigshot_core::work::TaskPayload;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::task::{RevokeOutcome, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, job_id, payload, state, worker, error, \
    enqueued_at, started_at, finished_at";

/// Provides queue operations over the `tasks` table.
pub struct TaskRepo;

impl TaskRepo {
    /// Enqueue a task for `job_id`.
    pub async fn enqueue(
        pool: &PgPool,
        job_id: DbId,
        payload: &TaskPayload,
    ) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (id, job_id, payload, state) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(Uuid::new_v4())
            .bind(job_id)
            .bind(Json(payload))
            .bind(TaskState::Queued.as_str())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest queued task for a worker.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// receive the same task.
    pub async fn claim_next(pool: &PgPool, worker: &str) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET state = $1, worker = $2, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE state = $3 \
                 ORDER BY enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskState::Running.as_str())
            .bind(worker)
            .bind(TaskState::Queued.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Record the final state of a running task.
    ///
    /// Returns `false` if the task was not running (e.g. already revoked).
    pub async fn finish(
        pool: &PgPool,
        id: Uuid,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET state = $2, error = $3, finished_at = NOW() \
             WHERE id = $1 AND state = $4",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(error)
        .bind(TaskState::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a queued or running task.
    pub async fn revoke(pool: &PgPool, id: Uuid) -> Result<RevokeOutcome, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET state = $2, finished_at = NOW() \
             WHERE id = $1 AND state IN ($3, $4)",
        )
        .bind(id)
        .bind(TaskState::Revoked.as_str())
        .bind(TaskState::Queued.as_str())
        .bind(TaskState::Running.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(RevokeOutcome::Revoked);
        }
        Ok(match Self::find_by_id(pool, id).await? {
            Some(task) => RevokeOutcome::AlreadyFinished(task.state),
            None => RevokeOutcome::Unknown,
        })
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
