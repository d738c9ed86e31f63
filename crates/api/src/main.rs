use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bigshot_db::pg_store::{PgDomainStore, PgJobStore};
use bigshot_events::{BroadcastConfig, BroadcastService, PgBroker};
use bigshot_pipeline::retention::{
    run_retention_loop, DEFAULT_NOTIFICATION_RETENTION_DAYS, RETENTION_INTERVAL,
};
use bigshot_pipeline::{
    CancellationController, JobQueryService, LifecycleReporter, PgTaskQueue, TaskDispatcher,
    Worker,
};
use bigshot_worker::{sources, ShutdownSignal, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bigshot_api::config::ServerConfig;
use bigshot_api::router::build_app_router;
use bigshot_api::state::AppState;
use bigshot_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigshot_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = bigshot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    bigshot_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    bigshot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Broadcast ---
    let background_cancel = CancellationToken::new();
    let broadcast = BroadcastService::new(
        Arc::new(PgBroker::new(pool.clone())),
        BroadcastConfig::from_env(),
    );
    let listener_handle = broadcast.start_listener(background_cancel.clone());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(broadcast.registry()));

    // --- Pipeline services ---
    let jobs = Arc::new(PgJobStore::new(pool.clone()));
    let queue = Arc::new(PgTaskQueue::new(pool.clone()));
    let reporter = LifecycleReporter::new(jobs.clone(), broadcast.clone());

    // --- Embedded workers ---
    let worker_handle = (config.embedded_workers > 0).then(|| {
        let worker_config = WorkerConfig::from_env();
        let worker = Worker::new(
            format!("{}-embedded", worker_config.name),
            reporter.clone(),
            Arc::new(PgDomainStore::new(pool.clone())),
            Arc::new(sources::default_registry(sources::http_client())),
            Arc::new(worker_config.credentials()),
        );
        tracing::info!(count = config.embedded_workers, "Starting embedded workers");
        WorkerPool::new(
            worker,
            queue.clone(),
            config.embedded_workers,
            worker_config.poll_interval,
        )
        .start(background_cancel.clone())
    });

    // --- Notification retention ---
    let retention_handle = tokio::spawn(run_retention_loop(
        jobs.clone(),
        DEFAULT_NOTIFICATION_RETENTION_DAYS,
        RETENTION_INTERVAL,
        background_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        broadcast: broadcast.clone(),
        dispatcher: TaskDispatcher::new(reporter.clone(), queue.clone()),
        cancellation: CancellationController::new(reporter, queue.clone()),
        query: JobQueryService::new(jobs, queue),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    let shutdown = ShutdownSignal::install().expect("Failed to install signal handlers");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.recv())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    background_cancel.cancel();
    if let Some(handle) = worker_handle {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!("Embedded workers did not stop in time");
        }
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), listener_handle).await;

    let ws_count = broadcast.registry().connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    broadcast.shutdown().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}
