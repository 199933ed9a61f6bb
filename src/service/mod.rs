//! Orchestrator wiring the realtime components together.
//!
//! [`RealtimeService`] owns one instance of every component, cross-wires them and
//! exposes the public API used by the rest of the app. There is no global
//! instance: callers construct and own the service.

mod bridge;
mod forwarder;

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{RealtimeError, Result};
use crate::events::{DispatchError, DispatcherStatsSnapshot, EventDispatcher, ListenerId, SubscribeOptions};
use crate::health::HealthStatus;
use crate::monitor::{DetailedStats, MetricsMonitor, ThresholdReport};
use crate::queue::{MessageQueue, Priority, QueueStats};
use crate::rooms::{RoomStats, RoomTracker};
use crate::tasks::{MetricsTickTask, QueueProcessorTask, RoomCleanupTask};
use crate::transport::Transport;

use bridge::{ConnectionSender, QueueRoomEmitter};
use forwarder::EventForwarder;

/// Full diagnostic snapshot of the service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub initialized: bool,
    pub connection: ConnectionState,
    pub queue: QueueStats,
    pub events: DispatcherStatsSnapshot,
    pub rooms: RoomStats,
    pub active_rooms: Vec<String>,
    pub performance: DetailedStats,
    pub thresholds: ThresholdReport,
    pub health: HealthStatus,
}

/// Running background tasks, present between `initialize` and `destroy`
struct Background {
    shutdown: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// Realtime client façade.
///
/// # Design
///
/// - Connection events reach the dispatcher, the monitor and the room tracker
///   through a single forwarder task
/// - Outbound traffic, room intents included, always goes through the queue
/// - Only `connect` and `force_reconnect` surface errors; everything else degrades
///   into counters, lifecycle events and health
pub struct RealtimeService {
    settings: Settings,
    connection: Arc<ConnectionManager>,
    queue: Arc<MessageQueue>,
    dispatcher: Arc<EventDispatcher>,
    rooms: Arc<RoomTracker>,
    monitor: Arc<MetricsMonitor>,
    background: Mutex<Option<Background>>,
}

impl RealtimeService {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let connection = Arc::new(ConnectionManager::new(settings.connection.clone(), transport));
        let queue = Arc::new(MessageQueue::new(settings.queue.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(settings.events.clone()));
        let monitor = Arc::new(MetricsMonitor::new(settings.metrics.clone()));
        let rooms = Arc::new(RoomTracker::new(Arc::new(QueueRoomEmitter::new(queue.clone()))));

        queue.set_sender(Arc::new(ConnectionSender::new(
            connection.clone(),
            monitor.clone(),
        )));

        Self {
            settings,
            connection,
            queue,
            dispatcher,
            rooms,
            monitor,
            background: Mutex::new(None),
        }
    }

    /// Start background processing. Returns `false` when already running.
    pub fn initialize(&self) -> bool {
        let mut background = self.background.lock();
        if background.is_some() {
            return false;
        }

        self.dispatcher.reopen();
        let (shutdown, _) = broadcast::channel(1);

        let forwarder = EventForwarder::new(
            self.connection.subscribe(),
            self.dispatcher.clone(),
            self.monitor.clone(),
            self.rooms.clone(),
            shutdown.subscribe(),
        );
        let handles = vec![
            tokio::spawn(forwarder.run()),
            tokio::spawn(QueueProcessorTask::new(self.queue.clone(), shutdown.subscribe()).run()),
            tokio::spawn(MetricsTickTask::new(self.monitor.clone(), shutdown.subscribe()).run()),
            tokio::spawn(
                RoomCleanupTask::new(
                    self.settings.rooms.clone(),
                    self.rooms.clone(),
                    shutdown.subscribe(),
                )
                .run(),
            ),
        ];

        *background = Some(Background { shutdown, handles });
        tracing::info!(
            url = %self.settings.connection.url,
            metrics_enabled = self.settings.metrics.enabled,
            "Realtime service initialized"
        );
        true
    }

    /// Stop everything: background tasks, the connection and pending traffic.
    /// Returns `false` when the service was not running.
    pub async fn destroy(&self) -> bool {
        let Some(background) = self.background.lock().take() else {
            return false;
        };

        let _ = background.shutdown.send(());
        let (_, results) = tokio::join!(self.connection.disconnect(), join_all(background.handles));
        for result in results {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        let dropped = self.queue.clear();
        let listeners = self.dispatcher.close();
        tracing::info!(dropped, listeners, "Realtime service destroyed");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.background.lock().is_some()
    }

    // Connection

    #[tracing::instrument(name = "service.connect", skip(self, token))]
    pub async fn connect(&self, user_id: &str, token: &str) -> Result<()> {
        if !self.is_initialized() {
            return Err(RealtimeError::NotInitialized);
        }
        self.connection.connect(user_id, token).await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub async fn force_reconnect(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(RealtimeError::NotInitialized);
        }
        self.connection.force_reconnect().await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // Rooms

    pub fn join_room(&self, room_id: &str) -> bool {
        self.rooms.join(room_id)
    }

    pub fn leave_room(&self, room_id: &str) -> bool {
        self.rooms.leave(room_id)
    }

    pub fn leave_all_rooms(&self) -> usize {
        self.rooms.leave_all()
    }

    pub fn broadcast_to_room(&self, room_id: &str, event: &str, data: Value) -> bool {
        self.rooms.broadcast(room_id, event, data)
    }

    // Messages

    pub fn send_message(&self, payload: Value) -> bool {
        self.queue.enqueue("sendMessage", payload, Priority::Normal)
    }

    pub fn send_typing_start(&self, conversation_id: &str) -> bool {
        self.queue.enqueue(
            "typingStart",
            json!({ "conversationId": conversation_id }),
            Priority::Low,
        )
    }

    pub fn send_typing_stop(&self, conversation_id: &str) -> bool {
        self.queue.enqueue(
            "typingStop",
            json!({ "conversationId": conversation_id }),
            Priority::Low,
        )
    }

    /// Emergency triggers always jump ahead of other traffic
    pub fn trigger_emergency(&self, payload: Value) -> bool {
        tracing::warn!("Emergency trigger queued");
        self.queue.enqueue("triggerEmergency", payload, Priority::Critical)
    }

    pub fn update_driver_status(&self, payload: Value) -> bool {
        self.queue.enqueue("updateDriverStatus", payload, Priority::High)
    }

    pub fn request_earnings_update(&self, payload: Value) -> bool {
        self.queue.enqueue("requestEarningsUpdate", payload, Priority::Normal)
    }

    pub fn request_performance_data(&self, payload: Value) -> bool {
        self.queue.enqueue("requestPerformanceData", payload, Priority::Low)
    }

    pub fn update_vehicle_checklist(&self, payload: Value) -> bool {
        self.queue.enqueue("updateVehicleChecklist", payload, Priority::Normal)
    }

    // Listeners

    pub fn subscribe<F, Fut>(
        &self,
        event_name: &str,
        callback: F,
        options: SubscribeOptions,
    ) -> std::result::Result<ListenerId, DispatchError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.dispatcher.subscribe(event_name, callback, options)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    // Health and status

    /// Healthy only if every component is healthy
    pub fn get_health_status(&self) -> HealthStatus {
        let components = [
            ("connection", self.connection.get_health_status()),
            ("queue", self.queue.get_health_status()),
            ("events", self.dispatcher.get_health_status()),
            ("rooms", self.rooms.get_health_status()),
            ("metrics", self.monitor.get_health_status()),
        ];

        let unhealthy: Vec<&str> = components
            .iter()
            .filter(|(_, status)| !status.healthy)
            .map(|(name, _)| *name)
            .collect();

        let mut details = Map::new();
        details.insert("initialized".to_string(), json!(self.is_initialized()));
        for (name, status) in &components {
            details.insert(
                name.to_string(),
                serde_json::to_value(status).unwrap_or(Value::Null),
            );
        }

        HealthStatus::from_check(
            unhealthy.is_empty(),
            format!("unhealthy components: {}", unhealthy.join(", ")),
            details,
        )
    }

    pub fn get_service_status(&self) -> ServiceStatus {
        ServiceStatus {
            initialized: self.is_initialized(),
            connection: self.connection.state(),
            queue: self.queue.stats(),
            events: self.dispatcher.stats(),
            rooms: self.rooms.stats(),
            active_rooms: self.rooms.active_rooms(),
            performance: self.monitor.get_detailed_stats(),
            thresholds: self.monitor.check_thresholds(),
            health: self.get_health_status(),
        }
    }

    /// Clear performance metrics and queue counters
    pub fn reset_metrics(&self) {
        self.monitor.reset();
        self.queue.reset_stats();
    }

    // Components

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn rooms(&self) -> &Arc<RoomTracker> {
        &self.rooms
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }
}

impl Drop for RealtimeService {
    fn drop(&mut self) {
        if let Some(background) = self.background.get_mut().take() {
            let _ = background.shutdown.send(());
            for handle in background.handles {
                handle.abort();
            }
        }
    }
}
