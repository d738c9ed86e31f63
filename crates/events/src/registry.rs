//! Connection registry for real-time clients.
//!
//! Owned by [`crate::service::BroadcastService`]. Each connection has a set
//! of per-job rooms and an optional membership of the "all jobs" room; a
//! published [`JobUpdate`] reaches every connection in either room exactly
//! once.

use std::collections::{BTreeSet, HashMap};

use bigshot_core::job_events::{job_room, ALL_JOBS_ROOM};
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use crate::update::JobUpdate;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A protocol event pushed to a client, serialized as
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        connected: bool,
        message: String,
        pubsub_available: bool,
        timestamp: Timestamp,
    },
    Subscribed {
        job_id: DbId,
        message: String,
        timestamp: Timestamp,
    },
    Unsubscribed {
        job_id: DbId,
        message: String,
        timestamp: Timestamp,
    },
    SubscribedAll {
        message: String,
        timestamp: Timestamp,
    },
    ActiveJobs {
        jobs: Vec<ActiveJobSummary>,
        count: usize,
        timestamp: Timestamp,
    },
    JobUpdate(JobUpdate),
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn connected(pubsub_available: bool) -> Self {
        ServerMessage::Connected {
            connected: true,
            message: "Connected to bigshot job updates".to_string(),
            pubsub_available,
            timestamp: Utc::now(),
        }
    }

    pub fn subscribed(job_id: DbId) -> Self {
        ServerMessage::Subscribed {
            job_id,
            message: format!("Subscribed to job {job_id} updates"),
            timestamp: Utc::now(),
        }
    }

    pub fn unsubscribed(job_id: DbId) -> Self {
        ServerMessage::Unsubscribed {
            job_id,
            message: format!("Unsubscribed from job {job_id} updates"),
            timestamp: Utc::now(),
        }
    }

    pub fn subscribed_all() -> Self {
        ServerMessage::SubscribedAll {
            message: "Subscribed to all job updates".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn active_jobs(jobs: Vec<ActiveJobSummary>) -> Self {
        ServerMessage::ActiveJobs {
            count: jobs.len(),
            jobs,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Snapshot row returned by `get_active_jobs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJobSummary {
    pub id: DbId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target: Option<String>,
    pub status: JobStatus,
    pub progress: i16,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// What the registry pushes down a connection's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Keep-alive; transports map it to a ping frame.
    Ping,
    /// The server is shutting down; transports send a close frame.
    Close,
}

/// Channel sender half for pushing messages to a connection.
pub type ClientSender = mpsc::UnboundedSender<Outbound>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct ClientConnection {
    user_id: DbId,
    sender: ClientSender,
    connected_at: Timestamp,
    subscriptions: BTreeSet<DbId>,
    all_jobs: bool,
}

impl ClientConnection {
    fn wants(&self, job_id: DbId) -> bool {
        self.all_jobs || self.subscriptions.contains(&job_id)
    }

    fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.subscriptions.iter().map(|id| job_room(*id)).collect();
        if self.all_jobs {
            rooms.push(ALL_JOBS_ROOM.to_string());
        }
        rooms
    }
}

/// Per-connection view returned by [`ClientRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub user_id: DbId,
    pub connected_at: Timestamp,
    pub subscriptions: Vec<DbId>,
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// All live real-time connections of this process, keyed by connection id.
///
/// Thread-safe via interior `RwLock`; shared through the broadcast service.
pub struct ClientRegistry {
    connections: RwLock<HashMap<String, ClientConnection>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register an authenticated connection.
    ///
    /// Returns the receiver half of its outbound channel.
    pub async fn register(
        &self,
        conn_id: String,
        user_id: DbId,
    ) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ClientConnection {
            user_id,
            sender: tx,
            connected_at: Utc::now(),
            subscriptions: BTreeSet::new(),
            all_jobs: false,
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, conn_id: &str) -> bool {
        self.connections.write().await.remove(conn_id).is_some()
    }

    /// Join the room of one job. Returns `false` for unknown connections.
    pub async fn subscribe_job(&self, conn_id: &str, job_id: DbId) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.subscriptions.insert(job_id);
                true
            }
            None => false,
        }
    }

    /// Leave the room of one job. Returns `false` for unknown connections.
    pub async fn unsubscribe_job(&self, conn_id: &str, job_id: DbId) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.subscriptions.remove(&job_id);
                true
            }
            None => false,
        }
    }

    /// Join the "all jobs" room. Returns `false` for unknown connections.
    pub async fn subscribe_all(&self, conn_id: &str) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.all_jobs = true;
                true
            }
            None => false,
        }
    }

    /// Send a message to one connection.
    pub async fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        self.connections
            .read()
            .await
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(Outbound::Message(message)).is_ok())
    }

    /// Push a job update to every connection in the job's room or the
    /// "all jobs" room, once per connection.
    ///
    /// Returns the number of connections the update was handed to.
    /// Connections whose channel has closed are skipped; their handler
    /// unregisters them on exit.
    pub async fn deliver(&self, update: &JobUpdate) -> usize {
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for conn in conns.values().filter(|c| c.wants(update.job_id)) {
            let message = Outbound::Message(ServerMessage::JobUpdate(update.clone()));
            if conn.sender.send(message).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send a keep-alive ping to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Outbound::Ping);
        }
    }

    /// Tell every connection to close, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Outbound::Close);
        }
        conns.clear();
        tracing::info!(count, "Closed all real-time connections");
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Snapshot of every connection and its rooms.
    pub async fn stats(&self) -> ConnectionStats {
        let conns = self.connections.read().await;
        let mut connections: Vec<ConnectionInfo> = conns
            .iter()
            .map(|(id, conn)| ConnectionInfo {
                connection_id: id.clone(),
                user_id: conn.user_id,
                connected_at: conn.connected_at,
                subscriptions: conn.subscriptions.iter().copied().collect(),
                rooms: conn.rooms(),
            })
            .collect();
        connections.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        ConnectionStats {
            active_connections: connections.len(),
            connections,
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bigshot_core::job_events::UpdateType;

    use super::*;

    fn update(job_id: DbId) -> JobUpdate {
        JobUpdate::new(
            UpdateType::Progress,
            job_id,
            JobType::DataCleanup,
            None,
            JobStatus::Running,
            10,
        )
    }

    #[tokio::test]
    async fn job_room_members_receive_only_their_job() {
        let registry = ClientRegistry::new();
        let mut rx = registry.register("c1".into(), 1).await;
        registry.subscribe_job("c1", 5).await;

        assert_eq!(registry.deliver(&update(6)).await, 0);
        assert_eq!(registry.deliver(&update(5)).await, 1);

        assert_matches!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::JobUpdate(u))) if u.job_id == 5
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn membership_in_both_rooms_delivers_once() {
        let registry = ClientRegistry::new();
        let mut rx = registry.register("c1".into(), 1).await;
        registry.subscribe_job("c1", 5).await;
        registry.subscribe_all("c1").await;

        assert_eq!(registry.deliver(&update(5)).await, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribed_connection_stops_receiving() {
        let registry = ClientRegistry::new();
        let _rx = registry.register("c1".into(), 1).await;
        registry.subscribe_job("c1", 5).await;
        registry.unsubscribe_job("c1", 5).await;
        assert_eq!(registry.deliver(&update(5)).await, 0);
    }

    #[tokio::test]
    async fn unknown_connection_operations_report_false() {
        let registry = ClientRegistry::new();
        assert!(!registry.subscribe_job("nope", 1).await);
        assert!(!registry.subscribe_all("nope").await);
        assert!(!registry.unregister("nope").await);
        assert!(!registry.send_to("nope", ServerMessage::error("x")).await);
    }

    #[tokio::test]
    async fn stats_list_rooms_per_connection() {
        let registry = ClientRegistry::new();
        let _rx = registry.register("c1".into(), 9).await;
        registry.subscribe_job("c1", 3).await;
        registry.subscribe_all("c1").await;

        let stats = registry.stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.connections[0].user_id, 9);
        assert_eq!(stats.connections[0].subscriptions, vec![3]);
        assert_eq!(stats.connections[0].rooms, vec!["job_3", "all_jobs"]);
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let registry = ClientRegistry::new();
        let mut rx = registry.register("c1".into(), 1).await;
        registry.shutdown_all().await;

        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert_eq!(registry.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn messages_serialize_as_event_envelopes() {
        let value = serde_json::to_value(ServerMessage::subscribed(4)).unwrap();
        assert_eq!(value["event"], "subscribed");
        assert_eq!(value["data"]["job_id"], 4);

        let value = serde_json::to_value(ServerMessage::JobUpdate(update(4))).unwrap();
        assert_eq!(value["event"], "job_update");
        assert_eq!(value["data"]["update_type"], "progress");

        let value = serde_json::to_value(ServerMessage::connected(false)).unwrap();
        assert_eq!(value["event"], "connected");
        assert_eq!(value["data"]["connected"], true);
        assert_eq!(value["data"]["pubsub_available"], false);
    }
}
