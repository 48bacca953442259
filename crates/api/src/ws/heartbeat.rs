//! Keep-alive pings for progress sockets that sit idle between batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// A running ping loop over every registered progress connection.
pub struct Heartbeat {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Ping all connections every `every`, starting one interval from now.
    pub fn spawn(ws_manager: Arc<WsManager>, every: Duration) -> Self {
        let stop = CancellationToken::new();
        let task = tokio::spawn(ping_until_stopped(ws_manager, every, stop.clone()));
        Self { stop, task }
    }

    /// End the loop and wait for it to exit.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "WebSocket heartbeat task panicked");
        }
    }
}

async fn ping_until_stopped(ws_manager: Arc<WsManager>, every: Duration, stop: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + every, every);
    // A late tick is dropped, never bunched up.
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticks.tick() => {}
        }
        let pinged = ws_manager.ping_all().await;
        if pinged > 0 {
            tracing::trace!(pinged, "WebSocket heartbeat");
        }
    }
    tracing::debug!("WebSocket heartbeat stopped");
}
