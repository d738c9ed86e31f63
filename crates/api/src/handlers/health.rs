//! Liveness endpoint, mounted outside `/api/v1`.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable (`true` when running without one).
    pub db_healthy: bool,
    /// Whether job updates currently travel through the shared broker.
    pub pubsub_available: bool,
}

/// GET /health -- returns service, database and broker health.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match &state.pool {
        Some(pool) => bigshot_db::health_check(pool).await.is_ok(),
        None => true,
    };
    let pubsub_available = state.broadcast.pubsub_available();

    let status = if db_healthy && pubsub_available {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        pubsub_available,
    })
}
