//! Client commands and their replies.
//!
//! Clients send `{"event": "<command>", "data": {...}}`; every command is
//! answered with one [`ServerMessage`] on the same connection.

use bigshot_core::types::DbId;
use bigshot_events::ServerMessage;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeJob { job_id: DbId },
    UnsubscribeJob { job_id: DbId },
    SubscribeAllJobs,
    GetActiveJobs,
}

/// Decode and apply one inbound text frame for `conn_id`.
pub async fn handle_client_message(
    state: &AppState,
    conn_id: &str,
    text: &str,
) -> ServerMessage {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(conn_id, error = %e, "Unrecognised client message");
            return ServerMessage::error(format!("Invalid message: {e}"));
        }
    };

    let registry = state.broadcast.registry();
    match message {
        ClientMessage::SubscribeJob { job_id } => {
            registry.subscribe_job(conn_id, job_id).await;
            tracing::debug!(conn_id, job_id, "Client subscribed to job");
            ServerMessage::subscribed(job_id)
        }
        ClientMessage::UnsubscribeJob { job_id } => {
            registry.unsubscribe_job(conn_id, job_id).await;
            ServerMessage::unsubscribed(job_id)
        }
        ClientMessage::SubscribeAllJobs => {
            registry.subscribe_all(conn_id).await;
            ServerMessage::subscribed_all()
        }
        ClientMessage::GetActiveJobs => match state.query.active_jobs().await {
            Ok(jobs) => ServerMessage::active_jobs(jobs),
            Err(e) => {
                tracing::error!(conn_id, error = %e, "Failed to load active jobs");
                ServerMessage::error("Failed to load active jobs")
            }
        },
    }
}
