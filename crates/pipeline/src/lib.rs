//! Job orchestration: dispatch, execution, lifecycle reporting,
//! cancellation and read-side queries.
//!
//! Control flow:
//! `TaskDispatcher` → [`queue::TaskQueue`] → `Worker` →
//! `LifecycleReporter` → {`JobStore`, `BroadcastService`}.
//! `CancellationController` goes straight to the queue and the reporter.

pub mod cancellation;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod plan;
pub mod processor;
pub mod query;
pub mod queue;
pub mod retention;
pub mod worker;

pub use cancellation::CancellationController;
pub use dispatcher::TaskDispatcher;
pub use error::PipelineError;
pub use lifecycle::LifecycleReporter;
pub use processor::{
    CredentialProvider, ProcessorRegistry, SourceError, SourceProcessor, StaticCredentials,
};
pub use query::{JobQueryService, JobStatusView, LogEntry, TaskStatusView};
pub use queue::{MemoryTaskQueue, PgTaskQueue, QueueError, QueuedTask, TaskQueue};
pub use worker::{ExecutionOutcome, Worker};
