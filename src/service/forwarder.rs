use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::connection::ConnectionEvent;
use crate::events::EventDispatcher;
use crate::monitor::MetricsMonitor;
use crate::rooms::{RoomServerEvent, RoomTracker};

/// Fans connection events out to the dispatcher, the monitor and the room tracker
pub(super) struct EventForwarder {
    events: BroadcastStream<ConnectionEvent>,
    dispatcher: Arc<EventDispatcher>,
    monitor: Arc<MetricsMonitor>,
    rooms: Arc<RoomTracker>,
    shutdown: broadcast::Receiver<()>,
}

impl EventForwarder {
    pub(super) fn new(
        events: broadcast::Receiver<ConnectionEvent>,
        dispatcher: Arc<EventDispatcher>,
        monitor: Arc<MetricsMonitor>,
        rooms: Arc<RoomTracker>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            events: BroadcastStream::new(events),
            dispatcher,
            monitor,
            rooms,
            shutdown,
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!("Event forwarder received shutdown signal");
                    break;
                }
                item = self.events.next() => match item {
                    Some(Ok(event)) => self.forward(event).await,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(skipped, "Event forwarder lagged, events skipped");
                        self.monitor.record_error("forwarder_lagged");
                    }
                    None => break,
                },
            }
        }
    }

    async fn forward(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected { resumed, .. } => {
                self.monitor.record_connection_start();
                self.monitor.record_event(event.name());
                if *resumed {
                    let rejoined = self.rooms.rejoin_all();
                    if rejoined > 0 {
                        tracing::info!(rejoined, "Re-issued room joins after reconnect");
                    }
                }
            }
            ConnectionEvent::Disconnected { .. } => {
                self.monitor.record_connection_end();
                self.monitor.record_event(event.name());
            }
            ConnectionEvent::Reconnecting { .. } => {
                self.monitor.record_event(event.name());
            }
            ConnectionEvent::ConnectError { .. }
            | ConnectionEvent::ReconnectFailed { .. }
            | ConnectionEvent::HeartbeatTimeout => {
                self.monitor.record_error(event.name());
            }
            ConnectionEvent::HeartbeatLatency { latency_ms } => {
                self.monitor.record_latency(*latency_ms as f64);
            }
            ConnectionEvent::Message { event: name, data } => {
                self.monitor.record_message_received();
                self.apply_room_event(name, data);
            }
        }

        self.dispatcher.emit(event.name(), event.payload()).await;
    }

    fn apply_room_event(&self, name: &str, data: &Value) {
        let Ok(kind) = name.parse::<RoomServerEvent>() else {
            return;
        };
        match data.get("roomId").and_then(Value::as_str) {
            Some(room_id) => {
                self.rooms.handle_server_event(kind, room_id, data);
            }
            None => tracing::debug!(event = %name, "Room event without roomId ignored"),
        }
    }
}
