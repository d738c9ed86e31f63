//! Broadcast service: the single publish chokepoint for job updates.
//!
//! - [`BroadcastService::publish`] sends the serialized update on the
//!   broker channel. It never fails: when the broker is down the update is
//!   delivered straight to this process's clients and a reconnect cycle is
//!   started if none is running. An update too large for the broker is
//!   delivered locally and leaves the link up.
//! - [`BroadcastService::run_listener`] drains the broker subscription into
//!   the [`ClientRegistry`]. It waits while the link is down and
//!   resubscribes once a reconnect cycle restores it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bigshot_core::job_events::JOB_UPDATES_CHANNEL;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerError};
use crate::reconnect::{
    reconnect_loop, ReconnectOutcome, ReconnectPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use crate::registry::ClientRegistry;
use crate::update::JobUpdate;

/// Channel name and reconnect policy.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub channel: String,
    pub reconnect: ReconnectPolicy,
}

impl BroadcastConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var                           | Default       |
    /// |-----------------------------------|---------------|
    /// | `JOB_UPDATES_CHANNEL`             | `job_updates` |
    /// | `BROKER_RECONNECT_MAX_ATTEMPTS`   | `5`           |
    /// | `BROKER_RECONNECT_MAX_DELAY_SECS` | `60`          |
    pub fn from_env() -> Self {
        let channel =
            std::env::var("JOB_UPDATES_CHANNEL").unwrap_or_else(|_| JOB_UPDATES_CHANNEL.into());

        let max_attempts: u32 = std::env::var("BROKER_RECONNECT_MAX_ATTEMPTS")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
            .parse()
            .expect("BROKER_RECONNECT_MAX_ATTEMPTS must be a valid u32");

        let max_delay_secs: u64 = std::env::var("BROKER_RECONNECT_MAX_DELAY_SECS")
            .unwrap_or_else(|_| DEFAULT_MAX_DELAY.as_secs().to_string())
            .parse()
            .expect("BROKER_RECONNECT_MAX_DELAY_SECS must be a valid u64");

        Self {
            channel,
            reconnect: ReconnectPolicy {
                max_attempts,
                max_delay: Duration::from_secs(max_delay_secs),
            },
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel: JOB_UPDATES_CHANNEL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

struct Shared {
    broker: Arc<dyn Broker>,
    registry: Arc<ClientRegistry>,
    config: BroadcastConfig,
    /// Whether the broker link is believed to be up.
    link: watch::Sender<bool>,
    /// A reconnect cycle is in flight.
    reconnecting: AtomicBool,
    cancel: CancellationToken,
}

/// Cheaply cloneable handle to the per-process broadcast service.
#[derive(Clone)]
pub struct BroadcastService {
    shared: Arc<Shared>,
}

impl BroadcastService {
    pub fn new(broker: Arc<dyn Broker>, config: BroadcastConfig) -> Self {
        let (link, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                broker,
                registry: Arc::new(ClientRegistry::new()),
                config,
                link,
                reconnecting: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.shared.registry
    }

    /// Whether cross-process delivery is currently available.
    pub fn pubsub_available(&self) -> bool {
        *self.shared.link.borrow()
    }

    /// Whether a reconnect cycle is currently running.
    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::SeqCst)
    }

    /// Publish a job update. Never fails; see the module docs.
    pub async fn publish(&self, update: &JobUpdate) {
        let payload = match serde_json::to_string(update) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    job_id = update.job_id,
                    error = %e,
                    "Failed to serialize job update",
                );
                return;
            }
        };

        if self.pubsub_available() {
            match self
                .shared
                .broker
                .publish(&self.shared.config.channel, &payload)
                .await
            {
                Ok(()) => return,
                Err(e @ BrokerError::PayloadTooLarge { .. }) => {
                    tracing::warn!(
                        job_id = update.job_id,
                        update_type = %update.update_type,
                        error = %e,
                        "Job update too large for the broker, delivering locally",
                    );
                    self.deliver_locally(update).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = update.job_id,
                        update_type = %update.update_type,
                        error = %e,
                        "Broker unavailable, delivering job update locally",
                    );
                    self.mark_down();
                }
            }
        } else {
            tracing::warn!(
                job_id = update.job_id,
                update_type = %update.update_type,
                "Broker link down, delivering job update locally",
            );
        }

        self.deliver_locally(update).await;
        self.ensure_reconnecting();
    }

    async fn deliver_locally(&self, update: &JobUpdate) {
        let delivered = self.shared.registry.deliver(update).await;
        tracing::debug!(job_id = update.job_id, delivered, "Delivered job update locally");
    }

    /// Start a reconnect cycle unless one is already running.
    ///
    /// Returns `true` if a new cycle was started.
    pub fn ensure_reconnecting(&self) -> bool {
        if self
            .shared
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let service = self.clone();
        tokio::spawn(async move {
            let shared = &service.shared;
            let outcome = reconnect_loop(&shared.config.reconnect, &shared.cancel, || {
                shared.broker.ping()
            })
            .await;

            match outcome {
                ReconnectOutcome::Reconnected { attempts } => {
                    tracing::info!(attempts, "Broker link restored");
                    shared.link.send_replace(true);
                }
                ReconnectOutcome::GaveUp { attempts } => {
                    tracing::error!(
                        attempts,
                        "Broker reconnect cycle exhausted, waiting for next publish",
                    );
                }
                ReconnectOutcome::Cancelled => {
                    tracing::debug!("Broker reconnect cancelled");
                }
            }
            shared.reconnecting.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Drain the broker channel into the registry until `cancel` fires.
    pub async fn run_listener(&self, cancel: CancellationToken) {
        let shared = &self.shared;
        let mut link = shared.link.subscribe();
        tracing::info!(channel = %shared.config.channel, "Job update listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shared.cancel.cancelled() => break,
                up = async { link.wait_for(|up| *up).await.map(|_| ()) } => {
                    if up.is_err() {
                        break;
                    }
                }
            }

            let mut stream = match shared.broker.subscribe(&shared.config.channel).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to subscribe to broker channel");
                    self.mark_down();
                    self.ensure_reconnecting();
                    continue;
                }
            };
            tracing::info!(channel = %shared.config.channel, "Subscribed to broker channel");

            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = shared.cancel.cancelled() => return,
                    item = stream.next() => item,
                };
                match item {
                    Some(Ok(payload)) => self.handle_payload(&payload).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Broker subscription error");
                        break;
                    }
                    None => break,
                }
            }

            tracing::warn!(channel = %shared.config.channel, "Broker subscription lost");
            self.mark_down();
            self.ensure_reconnecting();
        }

        tracing::info!("Job update listener stopped");
    }

    /// Spawn [`Self::run_listener`] as a background task.
    pub fn start_listener(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.run_listener(cancel).await })
    }

    /// Stop background work and close every client connection.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.registry.shutdown_all().await;
    }

    async fn handle_payload(&self, payload: &str) {
        match serde_json::from_str::<JobUpdate>(payload) {
            Ok(update) => {
                let delivered = self.shared.registry.deliver(&update).await;
                tracing::debug!(
                    job_id = update.job_id,
                    update_type = %update.update_type,
                    delivered,
                    "Broadcast job update",
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed job update payload");
            }
        }
    }

    fn mark_down(&self) {
        self.shared.link.send_replace(false);
    }
}
