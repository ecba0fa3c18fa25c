//! Snapshot persistence loop.
//!
//! Writes the fleet snapshot to SQLite every few seconds, backing off while
//! the database keeps failing, and once more on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

const PERSIST_BACKOFF_MAX_SECS: u64 = 60;

pub async fn run_persist_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let period = Duration::from_secs(state.config().persist_interval_s);
    let mut ticker = interval(period);
    let mut failures: u32 = 0;
    let mut next_attempt = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Persistence loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if Instant::now() < next_attempt {
                    continue;
                }
                match state.persist().await {
                    Ok(()) => failures = 0,
                    Err(err) => {
                        failures = failures.saturating_add(1);
                        let delay = backoff_delay(period, failures);
                        next_attempt = Instant::now() + delay;
                        tracing::warn!("Snapshot persist failed: {} (backing off {:?})", err, delay);
                    }
                }
            }
        }
    }

    if let Err(err) = state.persist().await {
        tracing::warn!("Final snapshot persist failed: {}", err);
    }
}

fn backoff_delay(period: Duration, failures: u32) -> Duration {
    let factor = 1u32 << failures.min(16);
    period
        .saturating_mul(factor)
        .min(Duration::from_secs(PERSIST_BACKOFF_MAX_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let period = Duration::from_secs(5);
        assert_eq!(backoff_delay(period, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(period, 2), Duration::from_secs(20));
        assert_eq!(backoff_delay(period, 10), Duration::from_secs(PERSIST_BACKOFF_MAX_SECS));
    }
}
