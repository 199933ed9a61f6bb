//! Adapters that plug the components into each other's seams.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::connection::{ConnectionError, ConnectionManager};
use crate::monitor::MetricsMonitor;
use crate::queue::{MessageQueue, MessageSender, Priority, QueuedMessage, SendError};
use crate::rooms::{RoomEmitter, RoomError, RoomIntent};

/// Queue sender writing through the connection manager
pub(super) struct ConnectionSender {
    connection: Arc<ConnectionManager>,
    monitor: Arc<MetricsMonitor>,
}

impl ConnectionSender {
    pub(super) fn new(connection: Arc<ConnectionManager>, monitor: Arc<MetricsMonitor>) -> Self {
        Self {
            connection,
            monitor,
        }
    }
}

#[async_trait]
impl MessageSender for ConnectionSender {
    async fn send(&self, message: &QueuedMessage) -> Result<(), SendError> {
        match self
            .connection
            .send(&message.event_name, message.payload.clone())
            .await
        {
            Ok(()) => {
                self.monitor.record_message_sent();
                Ok(())
            }
            // Offline is expected; the queue retries without counting an error
            Err(ConnectionError::NotConnected) => Err(SendError::NotConnected),
            Err(e) => {
                self.monitor.record_error("send_failed");
                Err(SendError::Failed(e.to_string()))
            }
        }
    }
}

/// Room emitter turning intents into queued protocol messages
pub(super) struct QueueRoomEmitter {
    queue: Arc<MessageQueue>,
}

impl QueueRoomEmitter {
    pub(super) fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }
}

impl RoomEmitter for QueueRoomEmitter {
    fn emit(&self, intent: &RoomIntent) -> Result<(), RoomError> {
        let (event_name, payload, priority) = match intent {
            RoomIntent::Join { room_id } => ("join_room", json!({ "roomId": room_id }), Priority::High),
            RoomIntent::Leave { room_id } => ("leave_room", json!({ "roomId": room_id }), Priority::High),
            RoomIntent::Broadcast {
                room_id,
                event,
                data,
            } => (
                "broadcast_to_room",
                json!({ "roomId": room_id, "event": event, "data": data }),
                Priority::Normal,
            ),
        };

        self.queue
            .try_enqueue(event_name, payload, priority)
            .map(|_| ())
            .map_err(|e| RoomError::EmitterFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{ConnectionConfig, MetricsConfig, QueueConfig};
    use crate::transport::MemoryTransport;

    #[test]
    fn test_room_intents_become_queued_messages() {
        let queue = Arc::new(MessageQueue::new(QueueConfig::default()));
        let emitter = QueueRoomEmitter::new(queue.clone());

        emitter
            .emit(&RoomIntent::Broadcast {
                room_id: "ride_42".to_string(),
                event: "eta".to_string(),
                data: json!({ "minutes": 4 }),
            })
            .unwrap();
        emitter
            .emit(&RoomIntent::Join {
                room_id: "ride_42".to_string(),
            })
            .unwrap();

        let queued = queue.snapshot();
        assert_eq!(queued[0].event_name, "join_room");
        assert_eq!(queued[0].priority, Priority::High);
        assert_eq!(queued[0].payload, json!({ "roomId": "ride_42" }));
        assert_eq!(queued[1].event_name, "broadcast_to_room");
        assert_eq!(queued[1].payload["data"]["minutes"], 4);
    }

    #[test]
    fn test_full_queue_fails_the_emitter() {
        let queue = Arc::new(MessageQueue::new(QueueConfig {
            max_size: 1,
            ..QueueConfig::default()
        }));
        let emitter = QueueRoomEmitter::new(queue);

        let join = |room: &str| RoomIntent::Join {
            room_id: room.to_string(),
        };
        assert!(emitter.emit(&join("a")).is_ok());
        assert!(matches!(
            emitter.emit(&join("b")),
            Err(RoomError::EmitterFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_sender_reports_offline() {
        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig::default(),
            Arc::new(MemoryTransport::new()),
        ));
        let monitor = Arc::new(MetricsMonitor::new(MetricsConfig::default()));
        let sender = ConnectionSender::new(connection, monitor.clone());

        let message = QueuedMessage::new("sendMessage", json!({}), Priority::Normal, 3);
        assert!(matches!(
            sender.send(&message).await,
            Err(SendError::NotConnected)
        ));
        assert_eq!(monitor.get_detailed_stats().total_errors, 0);
    }
}
