//! Shared wiring for pipeline integration tests: every seam is in-memory.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bigshot_core::types::DbId;
use bigshot_db::memory::{MemoryDomainStore, MemoryJobStore};
use bigshot_db::models::job::Job;
use bigshot_db::store::JobStore;
use bigshot_events::{
    BroadcastConfig, BroadcastService, JobUpdate, MemoryBroker, Outbound, ServerMessage,
};
use bigshot_pipeline::{
    CancellationController, JobQueryService, LifecycleReporter, MemoryTaskQueue,
    ProcessorRegistry, SourceError, SourceProcessor, StaticCredentials, TaskDispatcher, Worker,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Harness {
    pub jobs: Arc<MemoryJobStore>,
    pub domains: Arc<MemoryDomainStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub broker: Arc<MemoryBroker>,
    pub broadcast: BroadcastService,
    pub reporter: LifecycleReporter,
    pub dispatcher: TaskDispatcher,
    pub cancellation: CancellationController,
    pub query: JobQueryService,
}

impl Harness {
    pub fn new() -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let domains = Arc::new(MemoryDomainStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let broker = Arc::new(MemoryBroker::new());
        let broadcast = BroadcastService::new(broker.clone(), BroadcastConfig::default());
        let reporter = LifecycleReporter::new(jobs.clone(), broadcast.clone());

        Self {
            dispatcher: TaskDispatcher::new(reporter.clone(), queue.clone()),
            cancellation: CancellationController::new(reporter.clone(), queue.clone()),
            query: JobQueryService::new(jobs.clone(), queue.clone()),
            jobs,
            domains,
            queue,
            broker,
            broadcast,
            reporter,
        }
    }

    pub fn worker(&self, processors: ProcessorRegistry) -> Worker {
        Worker::new(
            "test-worker",
            self.reporter.clone(),
            self.domains.clone(),
            Arc::new(processors),
            Arc::new(StaticCredentials::new()),
        )
    }

    pub async fn job(&self, id: DbId) -> Job {
        self.jobs.find_by_id(id).await.unwrap().unwrap()
    }

    /// Register a client in the "all jobs" room. With the broker down every
    /// publish is delivered locally, so the receiver sees updates in order.
    pub async fn watch_all(&self) -> UnboundedReceiver<Outbound> {
        self.broker.set_available(false);
        let rx = self.broadcast.registry().register("watcher".into(), 1).await;
        self.broadcast.registry().subscribe_all("watcher").await;
        rx
    }
}

pub fn drain_updates(rx: &mut UnboundedReceiver<Outbound>) -> Vec<JobUpdate> {
    let mut updates = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Outbound::Message(ServerMessage::JobUpdate(update)) = message {
            updates.push(update);
        }
    }
    updates
}

// ---------------------------------------------------------------------------
// Source processors
// ---------------------------------------------------------------------------

/// Returns a fixed list of names for any target.
pub struct FixedSource {
    pub name: &'static str,
    pub names: Vec<&'static str>,
}

#[async_trait]
impl SourceProcessor for FixedSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn process(
        &self,
        _target: &str,
        _api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        Ok(self.names.iter().map(|n| n.to_string()).collect())
    }
}

/// Always fails.
pub struct FailingSource(pub &'static str);

#[async_trait]
impl SourceProcessor for FailingSource {
    fn name(&self) -> &str {
        self.0
    }

    async fn process(
        &self,
        _target: &str,
        _api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        Err(SourceError::HttpStatus(503))
    }
}

/// Cancels the job it is working for, then returns nothing.
pub struct CancellingSource {
    pub controller: CancellationController,
    pub job_id: AtomicI64,
}

impl CancellingSource {
    pub fn new(controller: CancellationController) -> Self {
        Self {
            controller,
            job_id: AtomicI64::new(0),
        }
    }

    pub fn target(&self, job_id: DbId) {
        self.job_id.store(job_id, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceProcessor for CancellingSource {
    fn name(&self) -> &str {
        "cancel"
    }

    async fn process(
        &self,
        _target: &str,
        _api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        let job_id = self.job_id.load(Ordering::SeqCst);
        self.controller
            .cancel(job_id)
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        Ok(Vec::new())
    }
}
