//! Pub/sub broker seam.
//!
//! [`PgBroker`] carries events between processes over Postgres
//! `LISTEN`/`NOTIFY`. [`MemoryBroker`] is a single-process stand-in backed
//! by `tokio::sync::broadcast` whose availability can be toggled to
//! simulate outages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;

/// Errors raised by a [`Broker`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The payload exceeds what the broker carries. Only this one message
    /// is affected; the link itself is fine.
    #[error("Payload of {size} bytes exceeds the broker limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Broker database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Largest payload `pg_notify` accepts, in bytes.
pub const PG_NOTIFY_MAX_PAYLOAD: usize = 7999;

fn check_payload_size(payload: &str, limit: usize) -> Result<(), BrokerError> {
    if payload.len() > limit {
        return Err(BrokerError::PayloadTooLarge {
            size: payload.len(),
            limit,
        });
    }
    Ok(())
}

/// Stream of raw payloads received on a subscribed channel.
///
/// The stream ends when the underlying connection is lost.
pub type PayloadStream = BoxStream<'static, Result<String, BrokerError>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a payload to every subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Subscribe to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError>;

    /// Cheap liveness check used while reconnecting.
    async fn ping(&self) -> Result<(), BrokerError>;
}

// ---------------------------------------------------------------------------
// Postgres LISTEN / NOTIFY
// ---------------------------------------------------------------------------

/// Broker over Postgres `NOTIFY` (publish) and a dedicated `LISTEN`
/// connection per subscription.
#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
}

impl PgBroker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        check_payload_size(payload, PG_NOTIFY_MAX_PAYLOAD)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(channel).await?;
        let stream = listener
            .into_stream()
            .map(|item| {
                item.map(|notification| notification.payload().to_string())
                    .map_err(BrokerError::from)
            })
            .boxed();
        Ok(stream)
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-process broker
// ---------------------------------------------------------------------------

/// Default buffer capacity for each channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process broker. Dropping it to "unavailable" closes every open
/// subscription, like a lost connection would.
pub struct MemoryBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    available: AtomicBool,
    max_payload: Option<usize>,
    published: AtomicUsize,
    pings: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            max_payload: None,
            published: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }

    /// Reject payloads longer than `limit` bytes, like `pg_notify` does.
    pub fn with_max_payload(mut self, limit: usize) -> Self {
        self.max_payload = Some(limit);
        self
    }

    /// Simulate the broker going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.lock_channels().clear();
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of payloads accepted by [`Broker::publish`].
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Number of [`Broker::ping`] calls, successful or not.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn lock_channels(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("memory broker is down".to_string()))
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        if let Some(limit) = self.max_payload {
            check_payload_size(payload, limit)?;
        }
        if let Some(sender) = self.lock_channels().get(channel) {
            // A send error only means there are zero receivers.
            let _ = sender.send(payload.to_string());
        }
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError> {
        self.check_available()?;
        let receiver = self
            .lock_channels()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(DEFAULT_CAPACITY).0)
            .subscribe();

        let stream = futures::stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((Ok(payload), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Memory broker subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();
        Ok(stream)
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_payloads() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("job_updates").await.unwrap();

        broker.publish("job_updates", "hello").await.unwrap();
        broker.publish("other", "ignored").await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "hello");
        assert_eq!(broker.published_count(), 2);
    }

    #[tokio::test]
    async fn outage_fails_calls_and_ends_streams() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("job_updates").await.unwrap();

        broker.set_available(false);
        assert!(stream.next().await.is_none());
        assert_matches!(
            broker.publish("job_updates", "x").await,
            Err(BrokerError::Unavailable(_))
        );
        assert!(broker.ping().await.is_err());
        assert_eq!(broker.ping_count(), 1);

        broker.set_available(true);
        assert!(broker.subscribe("job_updates").await.is_ok());
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_without_an_outage() {
        let broker = MemoryBroker::new().with_max_payload(8);

        assert_matches!(
            broker.publish("job_updates", "123456789").await,
            Err(BrokerError::PayloadTooLarge { size: 9, limit: 8 })
        );
        assert!(broker.is_available());
        assert!(broker.publish("job_updates", "12345678").await.is_ok());
        assert_eq!(broker.published_count(), 1);
    }
}
