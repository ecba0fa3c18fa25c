//! Periodic state broadcast to websocket clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

pub async fn run_broadcast_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_millis(state.config().broadcast_ms));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Broadcast loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                // skip serialization when nobody listens
                if state.tx.receiver_count() == 0 {
                    continue;
                }
                if let Err(err) = state.broadcast_snapshot() {
                    tracing::warn!("Snapshot broadcast failed: {}", err);
                }
            }
        }
    }
}
