//! Notification ledger retention.

use std::sync::Arc;
use std::time::Duration;

use bigshot_db::store::JobStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Ledger entries older than this many days are pruned.
pub const DEFAULT_NOTIFICATION_RETENTION_DAYS: u32 = 7;

/// How often [`run_retention_loop`] prunes.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Drop ledger entries older than `days` from jobs created before the same
/// cutoff. Returns the number of jobs touched.
pub async fn prune_notifications(jobs: &dyn JobStore, days: u32) -> Result<u64, PipelineError> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    let touched = jobs.prune_notifications(cutoff, cutoff).await?;
    if touched > 0 {
        tracing::info!(touched, days, "Pruned old job notifications");
    }
    Ok(touched)
}

/// Prune every `interval` until `cancel` fires. Errors are logged and the
/// loop keeps going.
pub async fn run_retention_loop(
    jobs: Arc<dyn JobStore>,
    days: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(days, interval_secs = interval.as_secs(), "Notification retention started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Notification retention stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = prune_notifications(jobs.as_ref(), days).await {
                    tracing::error!(error = %e, "Notification retention failed");
                }
            }
        }
    }
}
