//! Fixed-rate scheduler tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

pub async fn run_tick_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_millis(state.config().tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Tick loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let report = state.scheduler().tick();
                if report != Default::default() {
                    tracing::debug!(
                        assigned = report.assigned,
                        completed = report.completed,
                        arrived_at_charger = report.arrived_at_charger,
                        fully_charged = report.fully_charged,
                        "Tick"
                    );
                }
            }
        }
    }
}
