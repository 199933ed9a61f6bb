use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::RoomsConfig;
use crate::rooms::RoomTracker;

/// Purges rooms that stayed inactive past the configured age
pub struct RoomCleanupTask {
    config: RoomsConfig,
    rooms: Arc<RoomTracker>,
    shutdown: broadcast::Receiver<()>,
}

impl RoomCleanupTask {
    pub fn new(config: RoomsConfig, rooms: Arc<RoomTracker>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            config,
            rooms,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.config.cleanup_interval());
        timer.tick().await;

        tracing::info!(
            cleanup_interval_ms = self.config.cleanup_interval_ms,
            max_inactive_age_ms = self.config.max_inactive_age_ms,
            "Room cleanup task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Room cleanup task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.rooms.cleanup_inactive(self.config.max_inactive_age());
                }
            }
        }

        tracing::info!("Room cleanup task stopped");
    }
}
