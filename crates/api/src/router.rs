//! The HTTP surface of the API: one route table plus the middleware stack.
//!
//! ```text
//! GET    /health                          health_check
//!
//! GET    /api/v1/ws                       WebSocket (token in `?token=`)
//! GET    /api/v1/ws/stats                 connection_stats
//!
//! GET    /api/v1/jobs                     list_jobs
//! POST   /api/v1/jobs                     start_job
//! GET    /api/v1/jobs/stats               job_stats
//! GET    /api/v1/jobs/{id}                get_job
//! GET    /api/v1/jobs/{id}/status         job_status
//! GET    /api/v1/jobs/{id}/task-status    task_status
//! GET    /api/v1/jobs/{id}/logs           job_logs
//! GET    /api/v1/jobs/{id}/results        job_results
//! POST   /api/v1/jobs/{id}/cancel         cancel_job
//! ```
//!
//! The binary and the integration tests both build the app through
//! [`build_app_router`].

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::handlers::{health, jobs};
use crate::state::AppState;
use crate::ws;

/// Build the application [`Router`] for `state`.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/ws/stats", get(ws::connection_stats))
        .nest("/jobs", job_routes());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        // Applied bottom-up: the last `.layer` is outermost.
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// The `/jobs` resource. Every handler takes an authenticated user.
fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::start_job))
        .route("/stats", get(jobs::job_stats))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/status", get(jobs::job_status))
        .route("/{id}/task-status", get(jobs::task_status))
        .route("/{id}/logs", get(jobs::job_logs))
        .route("/{id}/results", get(jobs::job_results))
        .route("/{id}/cancel", post(jobs::cancel_job))
}

/// CORS for the configured origins. Only the verbs the route table uses
/// are allowed.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
