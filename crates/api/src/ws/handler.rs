use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bigshot_core::error::CoreError;
use bigshot_events::{Outbound, ServerMessage};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::protocol::handle_client_message;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// HTTP handler that authenticates and upgrades the connection to WebSocket.
///
/// The token is checked before the upgrade; a missing or invalid token is
/// answered with 401 and no connection is registered.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let token = params
        .token
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Missing token".into())))?;
    let user = AuthUser::from_token(&token, &state)?;

    match ws {
        Ok(ws) => Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user))),
        Err(rejection) => Ok(rejection.into_response()),
    }
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the client registry.
///   2. Spawns a sender task that forwards registry messages to the sink.
///   3. Answers inbound commands on the current task.
///   4. Unregisters on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let registry = state.broadcast.registry().clone();
    tracing::info!(conn_id = %conn_id, user_id = user.user_id, "WebSocket connected");

    let mut rx = registry.register(conn_id.clone(), user.user_id).await;
    registry
        .send_to(
            &conn_id,
            ServerMessage::connected(state.broadcast.pubsub_available()),
        )
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(
                            conn_id = %sender_conn_id,
                            error = %e,
                            "Unserialisable message",
                        );
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Bytes::new()),
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(frame).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&state, &conn_id, text.as_str()).await;
                registry.send_to(&conn_id, reply).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    registry.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Connection snapshot plus broker health.
#[derive(Debug, Serialize)]
pub struct RealtimeStats {
    pub pubsub_available: bool,
    #[serde(flatten)]
    pub connections: bigshot_events::ConnectionStats,
}

/// GET /api/v1/ws/stats
pub async fn connection_stats(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let connections = state.broadcast.registry().stats().await;
    Ok(Json(DataResponse {
        data: RealtimeStats {
            pubsub_available: state.broadcast.pubsub_available(),
            connections,
        },
    }))
}
