use std::time::Duration;

use bigshot_pipeline::StaticCredentials;

use crate::pool::MIN_POLL_INTERVAL;
use crate::sources::{SHODAN, VIRUSTOTAL};

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker name recorded on claimed tasks (default: `worker-<pid>`).
    pub name: String,
    /// Number of concurrent claim loops (default: `4`).
    pub concurrency: usize,
    /// Delay between claims when the queue is empty (default: `1000` ms,
    /// never below 1 ms).
    pub poll_interval: Duration,
    pub virustotal_api_key: Option<String>,
    pub shodan_api_key: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default          |
    /// |---------------------------|------------------|
    /// | `WORKER_NAME`             | `worker-<pid>`   |
    /// | `WORKER_CONCURRENCY`      | `4`              |
    /// | `WORKER_POLL_INTERVAL_MS` | `1000`           |
    /// | `VIRUSTOTAL_API_KEY`      | unset            |
    /// | `SHODAN_API_KEY`          | unset            |
    pub fn from_env() -> Self {
        let name = std::env::var("WORKER_NAME")
            .unwrap_or_else(|_| format!("worker-{}", std::process::id()));

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("WORKER_POLL_INTERVAL_MS must be a valid u64");

        Self {
            name,
            concurrency: concurrency.max(1),
            poll_interval: poll_interval_from_ms(poll_interval_ms),
            virustotal_api_key: std::env::var("VIRUSTOTAL_API_KEY").ok(),
            shodan_api_key: std::env::var("SHODAN_API_KEY").ok(),
        }
    }

    /// Credentials for the keyed sources.
    pub fn credentials(&self) -> StaticCredentials {
        StaticCredentials::new()
            .with_key(VIRUSTOTAL, self.virustotal_api_key.clone())
            .with_key(SHODAN, self.shodan_api_key.clone())
    }
}

fn poll_interval_from_ms(ms: u64) -> Duration {
    Duration::from_millis(ms).max(MIN_POLL_INTERVAL)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            virustotal_api_key: None,
            shodan_api_key: None,
        }
    }
}
