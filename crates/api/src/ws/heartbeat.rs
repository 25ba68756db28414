use std::sync::Arc;
use std::time::Duration;

use crate::ws::rooms::RoomRegistry;

/// Spawn a background task that sends periodic Ping frames to every
/// registered connection.
///
/// Pongs refresh participant activity, so live but quiet clients survive
/// the idle sweep. The returned `JoinHandle` is aborted during shutdown.
pub fn start_heartbeat(rooms: Arc<RoomRegistry>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            let count = rooms.ping_all().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
        }
    })
}
