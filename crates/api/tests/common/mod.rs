//! Shared wiring for API integration tests.
//!
//! The router is built with [`build_app_router`] on top of in-memory
//! stores, queue and broker, so the full middleware stack runs without
//! Postgres.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use bigshot_api::auth::jwt::{generate_access_token, JwtConfig};
use bigshot_api::config::ServerConfig;
use bigshot_api::router::build_app_router;
use bigshot_api::state::AppState;
use bigshot_db::memory::{MemoryDomainStore, MemoryJobStore};
use bigshot_events::{BroadcastConfig, BroadcastService, MemoryBroker};
use bigshot_pipeline::{
    CancellationController, JobQueryService, LifecycleReporter, MemoryTaskQueue,
    ProcessorRegistry, StaticCredentials, TaskDispatcher, Worker,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        embedded_workers: 0,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub jobs: Arc<MemoryJobStore>,
    pub domains: Arc<MemoryDomainStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub broker: Arc<MemoryBroker>,
    pub reporter: LifecycleReporter,
    /// Valid bearer token for user 1.
    pub token: String,
}

impl TestApp {
    /// A worker sharing this app's stores.
    pub fn worker(&self, processors: ProcessorRegistry) -> Worker {
        Worker::new(
            "api-test-worker",
            self.reporter.clone(),
            self.domains.clone(),
            Arc::new(processors),
            Arc::new(StaticCredentials::new()),
        )
    }
}

pub fn build_test_app() -> TestApp {
    let config = test_config();
    let jobs = Arc::new(MemoryJobStore::new());
    let domains = Arc::new(MemoryDomainStore::new());
    let queue = Arc::new(MemoryTaskQueue::new());
    let broker = Arc::new(MemoryBroker::new());
    let broadcast = BroadcastService::new(broker.clone(), BroadcastConfig::default());
    let reporter = LifecycleReporter::new(jobs.clone(), broadcast.clone());

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        broadcast,
        dispatcher: TaskDispatcher::new(reporter.clone(), queue.clone()),
        cancellation: CancellationController::new(reporter.clone(), queue.clone()),
        query: JobQueryService::new(jobs.clone(), queue.clone()),
    };
    let token = generate_access_token(1, "analyst", &config.jwt).unwrap();

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        jobs,
        domains,
        queue,
        broker,
        reporter,
        token,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the decoded body.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
