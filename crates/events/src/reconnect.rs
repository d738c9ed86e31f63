//! Bounded exponential-backoff reconnection.
//!
//! A reconnect cycle makes at most [`ReconnectPolicy::max_attempts`]
//! pings. Before attempt `n` (1-based) it waits `min(2^n, max_delay)`
//! seconds, so the default policy pings after 2, 4, 8, 16 and 32 seconds
//! and then gives up until something starts a fresh cycle.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default number of consecutive attempts per cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default upper bound on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Restart policy for a lost broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts per cycle before giving up.
    pub max_attempts: u32,
    /// Upper bound on the delay before any attempt.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`: `min(2^attempt, max_delay)` seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_delay)
    }

    /// Every delay of one full cycle, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|n| self.delay_for(n)).collect()
    }
}

/// How a reconnect cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A ping succeeded on the given attempt.
    Reconnected { attempts: u32 },
    /// Every attempt of the cycle failed.
    GaveUp { attempts: u32 },
    /// The cancellation token fired.
    Cancelled,
}

/// Run one reconnect cycle: wait, ping, repeat until a ping succeeds, the
/// attempt budget is exhausted, or `cancel` fires.
pub async fn reconnect_loop<F, Fut, E>(
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
    mut ping: F,
) -> ReconnectOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_for(attempt);
        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_secs = delay.as_secs(),
            "Scheduling broker reconnect attempt",
        );

        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            result = ping() => match result {
                Ok(()) => {
                    tracing::info!(attempt, "Broker connection restored");
                    return ReconnectOutcome::Reconnected { attempts: attempt };
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Broker reconnect attempt failed");
                }
            }
        }
    }

    ReconnectOutcome::GaveUp {
        attempts: policy.max_attempts,
    }
}
