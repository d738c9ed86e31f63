//! Distributed task queue seam.
//!
//! A task carries one job's [`TaskPayload`]. The queue owns the task's
//! [`TaskState`]; the job only stores the task id as a correlation key.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bigshot_core::task_state::TaskState;
use bigshot_core::types::DbId;
use bigshot_core::work::TaskPayload;
use bigshot_db::models::task::RevokeOutcome;
use bigshot_db::repositories::TaskRepo;
use bigshot_db::DbPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue unavailable: {0}")]
    Unavailable(String),

    #[error("Task queue database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A claimed task carried a payload that could not be decoded. The task
    /// has already been marked failed.
    #[error("Task {task_id} for job {job_id} has an invalid payload: {reason}")]
    InvalidPayload {
        task_id: String,
        job_id: DbId,
        reason: String,
    },
}

/// A task handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub id: String,
    pub job_id: DbId,
    pub payload: TaskPayload,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task for `job_id`, returning its correlation id.
    async fn submit(&self, job_id: DbId, payload: &TaskPayload) -> Result<String, QueueError>;

    /// Claim the oldest queued task, if any. A task is claimed at most once.
    async fn claim(&self, worker: &str) -> Result<Option<QueuedTask>, QueueError>;

    /// Record the final state of a claimed task. Ignored if the task was
    /// revoked in the meantime.
    async fn finish(
        &self,
        task_id: &str,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    /// Best-effort revoke of a queued or running task.
    async fn revoke(&self, task_id: &str) -> Result<RevokeOutcome, QueueError>;

    /// Live state of a task, or `None` if the queue does not know it.
    async fn state(&self, task_id: &str) -> Result<Option<TaskState>, QueueError>;
}

// ---------------------------------------------------------------------------
// Postgres-backed queue
// ---------------------------------------------------------------------------

/// Queue over the `tasks` table.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: DbPool,
}

impl PgTaskQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn submit(&self, job_id: DbId, payload: &TaskPayload) -> Result<String, QueueError> {
        let task = TaskRepo::enqueue(&self.pool, job_id, payload).await?;
        Ok(task.id.to_string())
    }

    async fn claim(&self, worker: &str) -> Result<Option<QueuedTask>, QueueError> {
        let Some(task) = TaskRepo::claim_next(&self.pool, worker).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<TaskPayload>(task.payload.clone()) {
            Ok(payload) => Ok(Some(QueuedTask {
                id: task.id.to_string(),
                job_id: task.job_id,
                payload,
            })),
            Err(e) => {
                let reason = e.to_string();
                TaskRepo::finish(&self.pool, task.id, TaskState::Failed, Some(&reason)).await?;
                Err(QueueError::InvalidPayload {
                    task_id: task.id.to_string(),
                    job_id: task.job_id,
                    reason,
                })
            }
        }
    }

    async fn finish(
        &self,
        task_id: &str,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        if let Ok(id) = Uuid::parse_str(task_id) {
            TaskRepo::finish(&self.pool, id, state, error).await?;
        }
        Ok(())
    }

    async fn revoke(&self, task_id: &str) -> Result<RevokeOutcome, QueueError> {
        match Uuid::parse_str(task_id) {
            Ok(id) => Ok(TaskRepo::revoke(&self.pool, id).await?),
            Err(_) => Ok(RevokeOutcome::Unknown),
        }
    }

    async fn state(&self, task_id: &str) -> Result<Option<TaskState>, QueueError> {
        match Uuid::parse_str(task_id) {
            Ok(id) => Ok(TaskRepo::find_by_id(&self.pool, id)
                .await?
                .map(|task| task.state)),
            Err(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// In-process queue
// ---------------------------------------------------------------------------

struct MemoryTask {
    job_id: DbId,
    payload: TaskPayload,
    state: TaskState,
    error: Option<String>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    tasks: HashMap<String, MemoryTask>,
}

/// In-process queue. Submissions and revokes can be made to fail to
/// simulate an unreachable broker.
pub struct MemoryTaskQueue {
    state: Mutex<QueueState>,
    accepting: AtomicBool,
    revocable: AtomicBool,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            accepting: AtomicBool::new(true),
            revocable: AtomicBool::new(true),
        }
    }

    /// Make [`TaskQueue::submit`] fail while `false`.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Make [`TaskQueue::revoke`] fail while `false`.
    pub fn set_revocable(&self, revocable: bool) {
        self.revocable.store(revocable, Ordering::SeqCst);
    }

    /// Number of tasks ever submitted.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Error recorded for a finished task.
    pub fn error_of(&self, task_id: &str) -> Option<String> {
        self.lock()
            .tasks
            .get(task_id)
            .and_then(|task| task.error.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn submit(&self, job_id: DbId, payload: &TaskPayload) -> Result<String, QueueError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable(
                "memory queue is not accepting tasks".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        let mut state = self.lock();
        state.tasks.insert(
            id.clone(),
            MemoryTask {
                job_id,
                payload: payload.clone(),
                state: TaskState::Queued,
                error: None,
            },
        );
        state.pending.push_back(id.clone());
        Ok(id)
    }

    async fn claim(&self, _worker: &str) -> Result<Option<QueuedTask>, QueueError> {
        let mut state = self.lock();
        while let Some(id) = state.pending.pop_front() {
            if let Some(task) = state.tasks.get_mut(&id) {
                if task.state == TaskState::Queued {
                    task.state = TaskState::Running;
                    return Ok(Some(QueuedTask {
                        id,
                        job_id: task.job_id,
                        payload: task.payload.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn finish(
        &self,
        task_id: &str,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        if let Some(task) = self.lock().tasks.get_mut(task_id) {
            if task.state == TaskState::Running {
                task.state = state;
                task.error = error.map(str::to_string);
            }
        }
        Ok(())
    }

    async fn revoke(&self, task_id: &str) -> Result<RevokeOutcome, QueueError> {
        if !self.revocable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable(
                "memory queue cannot reach workers".to_string(),
            ));
        }
        let mut state = self.lock();
        Ok(match state.tasks.get_mut(task_id) {
            Some(task) if task.state.is_ready() => RevokeOutcome::AlreadyFinished(task.state),
            Some(task) => {
                task.state = TaskState::Revoked;
                RevokeOutcome::Revoked
            }
            None => RevokeOutcome::Unknown,
        })
    }

    async fn state(&self, task_id: &str) -> Result<Option<TaskState>, QueueError> {
        Ok(self.lock().tasks.get(task_id).map(|task| task.state))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn tasks_are_claimed_once_in_order() {
        let queue = MemoryTaskQueue::new();
        let first = queue.submit(1, &TaskPayload::DataNormalization).await.unwrap();
        let second = queue.submit(2, &TaskPayload::DataDeduplication).await.unwrap();

        assert_eq!(queue.claim("w").await.unwrap().unwrap().id, first);
        assert_eq!(queue.claim("w").await.unwrap().unwrap().id, second);
        assert!(queue.claim("w").await.unwrap().is_none());
        assert_eq!(queue.state(&first).await.unwrap(), Some(TaskState::Running));
    }

    #[tokio::test]
    async fn revoked_task_is_never_claimed() {
        let queue = MemoryTaskQueue::new();
        let id = queue.submit(1, &TaskPayload::DataNormalization).await.unwrap();

        assert_eq!(queue.revoke(&id).await.unwrap(), RevokeOutcome::Revoked);
        assert!(queue.claim("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_reports_finished_and_unknown_tasks() {
        let queue = MemoryTaskQueue::new();
        let id = queue.submit(1, &TaskPayload::DataNormalization).await.unwrap();
        queue.claim("w").await.unwrap();
        queue.finish(&id, TaskState::Succeeded, None).await.unwrap();

        assert_eq!(
            queue.revoke(&id).await.unwrap(),
            RevokeOutcome::AlreadyFinished(TaskState::Succeeded)
        );
        assert_eq!(queue.revoke("missing").await.unwrap(), RevokeOutcome::Unknown);
    }

    #[tokio::test]
    async fn finish_does_not_overwrite_revoked_state() {
        let queue = MemoryTaskQueue::new();
        let id = queue.submit(1, &TaskPayload::DataNormalization).await.unwrap();
        queue.claim("w").await.unwrap();
        queue.revoke(&id).await.unwrap();
        queue.finish(&id, TaskState::Succeeded, None).await.unwrap();

        assert_eq!(queue.state(&id).await.unwrap(), Some(TaskState::Revoked));
    }

    #[tokio::test]
    async fn closed_queue_rejects_submissions() {
        let queue = MemoryTaskQueue::new();
        queue.set_accepting(false);
        assert_matches!(
            queue.submit(1, &TaskPayload::DataNormalization).await,
            Err(QueueError::Unavailable(_))
        );
        assert!(queue.is_empty());
    }
}
