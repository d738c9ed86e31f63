use bigshot_core::error::CoreError;

use crate::queue::QueueError;

/// Errors surfaced by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task queue error: {0}")]
    Queue(#[from] QueueError),
}

impl PipelineError {
    /// The job is in a status that does not allow the requested change.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PipelineError::Core(CoreError::Conflict(_)))
    }
}
