use std::sync::Arc;
use std::time::Duration;

use bigshot_db::pg_store::{PgDomainStore, PgJobStore};
use bigshot_events::{BroadcastConfig, BroadcastService, PgBroker};
use bigshot_pipeline::{LifecycleReporter, PgTaskQueue, Worker};
use bigshot_worker::{sources, ShutdownSignal, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigshot_worker=debug,bigshot_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        name = %config.name,
        concurrency = config.concurrency,
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = bigshot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    bigshot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Broadcast ---
    let broadcast = BroadcastService::new(
        Arc::new(PgBroker::new(pool.clone())),
        BroadcastConfig::from_env(),
    );

    // --- Worker pool ---
    let jobs = Arc::new(PgJobStore::new(pool.clone()));
    let reporter = LifecycleReporter::new(jobs, broadcast.clone());
    let worker = Worker::new(
        config.name.clone(),
        reporter,
        Arc::new(PgDomainStore::new(pool.clone())),
        Arc::new(sources::default_registry(sources::http_client())),
        Arc::new(config.credentials()),
    );
    let shutdown = ShutdownSignal::install().expect("Failed to install signal handlers");
    let cancel = CancellationToken::new();
    let handle = WorkerPool::new(
        worker,
        Arc::new(PgTaskQueue::new(pool)),
        config.concurrency,
        config.poll_interval,
    )
    .start(cancel.clone());

    shutdown.recv().await;
    tracing::info!("Finishing in-flight tasks");

    cancel.cancel();
    broadcast.shutdown().await;
    if tokio::time::timeout(Duration::from_secs(60), handle).await.is_err() {
        tracing::warn!("Worker pool did not stop in time");
    }
    tracing::info!("Worker stopped");
}
