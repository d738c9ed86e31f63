//! Worker pool: N concurrent claim loops over one task queue.
//!
//! Each loop wakes every `poll_interval`, then drains the queue one task at
//! a time until it is empty. Tasks already running when the pool is
//! cancelled are finished before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use bigshot_pipeline::{TaskQueue, Worker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shortest accepted poll interval; `tokio::time::interval` rejects zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct WorkerPool {
    worker: Worker,
    queue: Arc<dyn TaskQueue>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        worker: Worker,
        queue: Arc<dyn TaskQueue>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            queue,
            concurrency: concurrency.max(1),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Spawn the pool onto the runtime.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Run every claim loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            worker = %self.worker.name(),
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        let loops: Vec<_> = (0..self.concurrency)
            .map(|slot| {
                tokio::spawn(claim_loop(
                    slot,
                    self.worker.clone(),
                    Arc::clone(&self.queue),
                    self.poll_interval,
                    cancel.clone(),
                ))
            })
            .collect();

        for handle in futures::future::join_all(loops).await {
            if let Err(e) = handle {
                tracing::error!(error = %e, "Claim loop panicked");
            }
        }
        tracing::info!(worker = %self.worker.name(), "Worker pool stopped");
    }
}

async fn claim_loop(
    slot: usize,
    worker: Worker,
    queue: Arc<dyn TaskQueue>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(slot, "Claim loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                while !cancel.is_cancelled() {
                    match worker.run_next(queue.as_ref()).await {
                        Ok(Some(outcome)) => {
                            tracing::debug!(slot, state = %outcome.task_state(), "Task finished");
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(slot, error = %e, "Claim cycle failed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
