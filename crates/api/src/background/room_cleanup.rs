//! Periodic eviction of idle room participants.
//!
//! Participants whose connection has shown no activity (frames or pongs)
//! for longer than the idle timeout are removed from their room and their
//! socket is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::RoomRegistry;

/// Run the idle sweep every `every` until `cancel` is triggered.
pub async fn run(
    rooms: Arc<RoomRegistry>,
    idle_timeout: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        interval_secs = every.as_secs(),
        "Room cleanup job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Room cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = rooms.cleanup_inactive(idle_timeout).await;
                if evicted.is_empty() {
                    tracing::trace!("Room cleanup: no idle participants");
                } else {
                    tracing::info!(count = evicted.len(), "Room cleanup: evicted idle participants");
                }
            }
        }
    }
}
