use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::queue::{MessageQueue, TickOutcome};

/// Drains the outbound queue, one message per tick
pub struct QueueProcessorTask {
    queue: Arc<MessageQueue>,
    shutdown: broadcast::Receiver<()>,
}

impl QueueProcessorTask {
    pub fn new(queue: Arc<MessageQueue>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { queue, shutdown }
    }

    pub async fn run(mut self) {
        let interval = self.queue.config().processing_interval();
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await;

        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            "Queue processor started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Queue processor received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    match self.queue.process_next().await {
                        TickOutcome::Sent { id } => {
                            tracing::trace!(message_id = %id, "Queued message sent");
                        }
                        TickOutcome::Dropped { id } => {
                            tracing::warn!(message_id = %id, "Queued message dropped");
                        }
                        _ => {}
                    }
                }
            }
        }

        tracing::info!("Queue processor stopped");
    }
}
