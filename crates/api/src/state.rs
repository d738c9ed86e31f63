use std::sync::Arc;

use bigshot_db::DbPool;
use bigshot_events::BroadcastService;
use bigshot_pipeline::{CancellationController, JobQueryService, TaskDispatcher};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (every service is a handle over `Arc`s).
#[derive(Clone)]
pub struct AppState {
    /// Database pool, `None` when the services run on in-memory stores.
    pub pool: Option<DbPool>,
    pub config: Arc<ServerConfig>,
    /// Job update fan-out; owns the real-time client registry.
    pub broadcast: BroadcastService,
    pub dispatcher: TaskDispatcher,
    pub cancellation: CancellationController,
    pub query: JobQueryService,
}
