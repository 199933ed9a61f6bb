use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::{EventsConfig, ListenerCapacity};
use crate::health::HealthStatus;
use crate::metrics::DispatchMetrics;

use super::{DispatchError, Listener, ListenerCallback, ListenerId, SubscribeOptions};

/// One recorded emission
#[derive(Debug, Clone, Serialize)]
pub struct EmitRecord {
    pub event_name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub listener_count: usize,
}

/// Dispatcher counters
#[derive(Debug, Default)]
struct DispatcherStats {
    total_emitted: AtomicU64,
    listener_errors: AtomicU64,
    listener_timeouts: AtomicU64,
    listener_panics: AtomicU64,
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_emitted: u64,
    pub listener_errors: u64,
    pub listener_timeouts: u64,
    pub listener_panics: u64,
    pub listeners: usize,
    pub event_names: usize,
    pub closed: bool,
}

/// Pub/sub dispatcher with priority ordering, one-shot listeners and bounded history
pub struct EventDispatcher {
    config: EventsConfig,
    /// Per event name, sorted by descending priority then subscription order
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    history: Mutex<VecDeque<EmitRecord>>,
    closed: AtomicBool,
    stats: DispatcherStats,
}

impl EventDispatcher {
    pub fn new(config: EventsConfig) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_size)),
            config,
            listeners: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stats: DispatcherStats::default(),
        }
    }

    /// Register a listener for `event_name`
    pub fn subscribe<F, Fut>(
        &self,
        event_name: &str,
        callback: F,
        options: SubscribeOptions,
    ) -> Result<ListenerId, DispatchError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: ListenerCallback = Arc::new(move |data| callback(data).boxed());
        self.subscribe_callback(event_name, callback, options)
    }

    /// Register an already type-erased callback
    pub fn subscribe_callback(
        &self,
        event_name: &str,
        callback: ListenerCallback,
        options: SubscribeOptions,
    ) -> Result<ListenerId, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }

        let mut listeners = self.listeners.write();
        let max = self.config.max_listeners;
        let at_capacity = match self.config.listener_capacity {
            ListenerCapacity::Total => total_listeners(&listeners) >= max,
            ListenerCapacity::EventNames => {
                !listeners.contains_key(event_name) && listeners.len() >= max
            }
        };
        if at_capacity {
            tracing::warn!(event = %event_name, max, "Listener capacity exceeded");
            return Err(DispatchError::CapacityExceeded { max });
        }

        let id = Uuid::new_v4();
        let entry = listeners.entry(event_name.to_string()).or_default();
        let position = entry
            .iter()
            .position(|l| l.priority < options.priority)
            .unwrap_or(entry.len());
        entry.insert(
            position,
            Listener {
                id,
                event_name: event_name.to_string(),
                callback,
                once: options.once,
                priority: options.priority,
            },
        );

        DispatchMetrics::set_listeners(total_listeners(&listeners));
        tracing::debug!(
            listener_id = %id,
            event = %event_name,
            once = options.once,
            priority = options.priority,
            "Listener subscribed"
        );

        Ok(id)
    }

    /// Remove one listener; returns whether it existed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();

        let Some(event_name) = listeners
            .iter()
            .find(|(_, list)| list.iter().any(|l| l.id == id))
            .map(|(name, _)| name.clone())
        else {
            return false;
        };

        if let Some(list) = listeners.get_mut(&event_name) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(&event_name);
            }
        }
        DispatchMetrics::set_listeners(total_listeners(&listeners));
        true
    }

    /// Remove all listeners of one event, or of every event when `None`
    pub fn unsubscribe_all(&self, event_name: Option<&str>) -> usize {
        let mut listeners = self.listeners.write();
        let removed = match event_name {
            Some(name) => listeners.remove(name).map(|l| l.len()).unwrap_or(0),
            None => {
                let count = total_listeners(&listeners);
                listeners.clear();
                count
            }
        };
        DispatchMetrics::set_listeners(total_listeners(&listeners));
        removed
    }

    /// Deliver `data` to every listener of `event_name`.
    ///
    /// Returns `false` only once the dispatcher is closed. Listener failures are
    /// logged and counted.
    #[tracing::instrument(name = "dispatcher.emit", skip(self, data))]
    pub async fn emit(&self, event_name: &str, data: Value) -> bool {
        if self.is_closed() {
            return false;
        }

        let snapshot = self.take_listeners(event_name);
        self.record_history(event_name, &data, snapshot.len());
        self.stats.total_emitted.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_emitted();

        if snapshot.is_empty() {
            return true;
        }

        let emit_timeout = self.config.emit_timeout();
        let timeout_ms = self.config.emit_timeout_ms;

        let deliveries = snapshot.into_iter().map(|listener| {
            let data = data.clone();
            async move {
                let result = deliver(&listener, data, emit_timeout, timeout_ms).await;
                (listener, result)
            }
        });

        for (listener, result) in join_all(deliveries).await {
            let Err(e) = result else { continue };
            match e {
                DispatchError::ListenerTimedOut { .. } => {
                    self.stats.listener_timeouts.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_listener_timeout();
                }
                DispatchError::ListenerPanicked { .. } => {
                    self.stats.listener_panics.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_listener_panic();
                }
                _ => {
                    self.stats.listener_errors.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_listener_error();
                }
            }
            tracing::warn!(event = %event_name, error = %e, "Listener failed");

            if listener.once {
                self.restore_once(listener);
            }
        }

        true
    }

    /// Put back a `once` listener whose delivery did not complete
    fn restore_once(&self, listener: Listener) {
        if self.is_closed() {
            return;
        }

        let mut listeners = self.listeners.write();
        let entry = listeners.entry(listener.event_name.clone()).or_default();
        let position = entry
            .iter()
            .position(|l| l.priority < listener.priority)
            .unwrap_or(entry.len());
        tracing::debug!(
            listener_id = %listener.id,
            event = %listener.event_name,
            "One-shot listener kept after failed delivery"
        );
        entry.insert(position, listener);
        DispatchMetrics::set_listeners(total_listeners(&listeners));
    }

    /// Snapshot the listeners of one event, detaching `once` listeners
    fn take_listeners(&self, event_name: &str) -> Vec<Listener> {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(event_name) else {
            return Vec::new();
        };

        let snapshot = list.clone();
        if list.iter().any(|l| l.once) {
            list.retain(|l| !l.once);
            if list.is_empty() {
                listeners.remove(event_name);
            }
            DispatchMetrics::set_listeners(total_listeners(&listeners));
        }
        snapshot
    }

    fn record_history(&self, event_name: &str, data: &Value, listener_count: usize) {
        if self.config.history_size == 0 {
            return;
        }

        let mut history = self.history.lock();
        while history.len() >= self.config.history_size {
            history.pop_front();
        }
        history.push_back(EmitRecord {
            event_name: event_name.to_string(),
            data: data.clone(),
            timestamp: Utc::now(),
            listener_count,
        });
    }

    /// Number of listeners for one event, or in total
    pub fn listener_count(&self, event_name: Option<&str>) -> usize {
        let listeners = self.listeners.read();
        match event_name {
            Some(name) => listeners.get(name).map(Vec::len).unwrap_or(0),
            None => total_listeners(&listeners),
        }
    }

    /// Event names with at least one listener, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Most recent emissions, oldest first
    pub fn history(&self) -> Vec<EmitRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        let (listeners, event_names) = {
            let map = self.listeners.read();
            (total_listeners(&map), map.len())
        };

        DispatcherStatsSnapshot {
            total_emitted: self.stats.total_emitted.load(Ordering::Relaxed),
            listener_errors: self.stats.listener_errors.load(Ordering::Relaxed),
            listener_timeouts: self.stats.listener_timeouts.load(Ordering::Relaxed),
            listener_panics: self.stats.listener_panics.load(Ordering::Relaxed),
            listeners,
            event_names,
            closed: self.is_closed(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reject further emissions and drop every listener; returns how many were removed
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let removed = self.unsubscribe_all(None);
        self.history.lock().clear();
        tracing::debug!(removed, "Dispatcher closed");
        removed
    }

    /// Reopen after `close`
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let stats = self.stats();
        let max = self.config.max_listeners;
        let used = match self.config.listener_capacity {
            ListenerCapacity::Total => stats.listeners,
            ListenerCapacity::EventNames => stats.event_names,
        };

        let mut details = Map::new();
        details.insert("listeners".to_string(), json!(stats.listeners));
        details.insert("event_names".to_string(), json!(stats.event_names));
        details.insert("max_listeners".to_string(), json!(max));
        details.insert("total_emitted".to_string(), json!(stats.total_emitted));
        details.insert(
            "listener_failures".to_string(),
            json!(stats.listener_errors + stats.listener_timeouts + stats.listener_panics),
        );

        if stats.closed {
            return HealthStatus::unhealthy("dispatcher is closed", details);
        }
        HealthStatus::from_check(
            used < max,
            format!("listener capacity reached ({used}/{max})"),
            details,
        )
    }
}

/// Run one listener, isolating errors, panics and timeouts
async fn deliver(
    listener: &Listener,
    data: Value,
    emit_timeout: std::time::Duration,
    timeout_ms: u64,
) -> Result<(), DispatchError> {
    let listener_id = listener.id;
    let callback = &listener.callback;

    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| callback(data))) {
        Ok(future) => future,
        Err(_) => return Err(DispatchError::ListenerPanicked { listener_id }),
    };

    match timeout(emit_timeout, AssertUnwindSafe(future).catch_unwind()).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(DispatchError::ListenerFailed {
            listener_id,
            message: format!("{e:#}"),
        }),
        Ok(Err(_)) => Err(DispatchError::ListenerPanicked { listener_id }),
        Err(_) => Err(DispatchError::ListenerTimedOut {
            listener_id,
            timeout_ms,
        }),
    }
}

fn total_listeners(listeners: &HashMap<String, Vec<Listener>>) -> usize {
    listeners.values().map(Vec::len).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(EventsConfig::default())
    }

    fn counter_listener(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(Value) -> futures::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_priority_order() {
        let dispatcher = dispatcher();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for (name, priority) in [("low", 0), ("high", 10), ("mid", 5), ("mid-later", 5)] {
            let calls = calls.clone();
            dispatcher
                .subscribe(
                    "rideStatusUpdate",
                    move |_| {
                        let calls = calls.clone();
                        async move {
                            calls.lock().push(name);
                            Ok(())
                        }
                    },
                    SubscribeOptions::with_priority(priority),
                )
                .unwrap();
        }

        assert!(dispatcher.emit("rideStatusUpdate", json!({})).await);
        assert_eq!(*calls.lock(), vec!["high", "mid", "mid-later", "low"]);
    }

    #[tokio::test]
    async fn test_once_listener_fires_once() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher
            .subscribe("connected", counter_listener(&counter), SubscribeOptions::once())
            .unwrap();

        dispatcher.emit("connected", json!({})).await;
        dispatcher.emit("connected", json!({})).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(Some("connected")), 0);
    }

    #[tokio::test]
    async fn test_once_listener_under_overlapping_emits() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher
            .subscribe("connected", counter_listener(&counter), SubscribeOptions::once())
            .unwrap();

        let (a, b) = tokio::join!(
            dispatcher.emit("connected", json!(1)),
            dispatcher.emit("connected", json!(2))
        );

        assert!(a && b);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    async fn assert_once_listener_retried(dispatcher: &EventDispatcher, counter: &Arc<AtomicUsize>) {
        assert_eq!(dispatcher.listener_count(Some("rideRequest")), 1);

        dispatcher
            .subscribe("rideRequest", counter_listener(counter), SubscribeOptions::default())
            .unwrap();
        assert!(dispatcher.emit("rideRequest", json!({})).await);
        assert_eq!(dispatcher.listener_count(Some("rideRequest")), 1);
    }

    #[tokio::test]
    async fn test_once_listener_kept_after_error() {
        let dispatcher = dispatcher();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = attempts.clone();
        dispatcher
            .subscribe(
                "rideRequest",
                move |_| {
                    let first = seen.fetch_add(1, Ordering::SeqCst) == 0;
                    async move {
                        if first {
                            return Err(anyhow::anyhow!("not ready"));
                        }
                        Ok(())
                    }
                },
                SubscribeOptions::once(),
            )
            .unwrap();

        assert!(dispatcher.emit("rideRequest", json!({})).await);
        assert_eq!(dispatcher.stats().listener_errors, 1);

        assert_once_listener_retried(&dispatcher, &counter).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_listener_kept_after_timeout() {
        let dispatcher = dispatcher();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = attempts.clone();
        dispatcher
            .subscribe(
                "rideRequest",
                move |_| {
                    let first = seen.fetch_add(1, Ordering::SeqCst) == 0;
                    async move {
                        if first {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                        }
                        Ok(())
                    }
                },
                SubscribeOptions::once(),
            )
            .unwrap();

        assert!(dispatcher.emit("rideRequest", json!({})).await);
        assert_eq!(dispatcher.stats().listener_timeouts, 1);

        assert_once_listener_retried(&dispatcher, &counter).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_once_listener_kept_after_panic() {
        let dispatcher = dispatcher();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = attempts.clone();
        dispatcher
            .subscribe(
                "rideRequest",
                move |_| {
                    let first = seen.fetch_add(1, Ordering::SeqCst) == 0;
                    async move {
                        if first {
                            panic!("listener exploded");
                        }
                        Ok(())
                    }
                },
                SubscribeOptions::once(),
            )
            .unwrap();

        assert!(dispatcher.emit("rideRequest", json!({})).await);
        assert_eq!(dispatcher.stats().listener_panics, 1);

        assert_once_listener_retried(&dispatcher, &counter).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_once_listener_keeps_priority_slot() {
        let dispatcher = dispatcher();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(AtomicBool::new(false));

        for (name, priority, once) in [("high", 10, true), ("low", 0, false)] {
            let calls = calls.clone();
            let failed = failed.clone();
            let options = SubscribeOptions {
                once,
                ..SubscribeOptions::with_priority(priority)
            };
            dispatcher
                .subscribe(
                    "rideRequest",
                    move |_| {
                        calls.lock().push(name);
                        let fail = once && !failed.swap(true, Ordering::SeqCst);
                        async move {
                            if fail {
                                return Err(anyhow::anyhow!("not ready"));
                            }
                            Ok(())
                        }
                    },
                    options,
                )
                .unwrap();
        }

        dispatcher.emit("rideRequest", json!({})).await;
        dispatcher.emit("rideRequest", json!({})).await;
        dispatcher.emit("rideRequest", json!({})).await;

        assert_eq!(*calls.lock(), vec!["high", "low", "high", "low", "low"]);
    }

    #[tokio::test]
    async fn test_failed_once_listener_dropped_when_closed() {
        let dispatcher = Arc::new(dispatcher());
        let closer = dispatcher.clone();
        dispatcher
            .subscribe(
                "rideRequest",
                move |_| {
                    closer.close();
                    async { Err(anyhow::anyhow!("closing")) }
                },
                SubscribeOptions::once(),
            )
            .unwrap();

        dispatcher.emit("rideRequest", json!({})).await;
        assert_eq!(dispatcher.listener_count(None), 0);
    }

    #[tokio::test]
    async fn test_emit_without_listeners() {
        let dispatcher = dispatcher();

        assert!(dispatcher.emit("unknown_event", json!({"x": 1})).await);

        let history = dispatcher.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_name, "unknown_event");
        assert_eq!(history[0].listener_count, 0);
        assert!(dispatcher.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher
            .subscribe(
                "earningsUpdate",
                |_| async { Err(anyhow::anyhow!("listener error")) },
                SubscribeOptions::with_priority(10),
            )
            .unwrap();
        dispatcher
            .subscribe(
                "earningsUpdate",
                |_| async {
                    if true {
                        panic!("listener exploded");
                    }
                    Ok(())
                },
                SubscribeOptions::with_priority(5),
            )
            .unwrap();
        dispatcher
            .subscribe(
                "earningsUpdate",
                counter_listener(&counter),
                SubscribeOptions::default(),
            )
            .unwrap();

        assert!(dispatcher.emit("earningsUpdate", json!({"amount": 12.5})).await);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let stats = dispatcher.stats();
        assert_eq!(stats.listener_errors, 1);
        assert_eq!(stats.listener_panics, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listener_times_out() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher
            .subscribe(
                "heartbeat",
                |_| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                },
                SubscribeOptions::default(),
            )
            .unwrap();
        dispatcher
            .subscribe("heartbeat", counter_listener(&counter), SubscribeOptions::default())
            .unwrap();

        let started = tokio::time::Instant::now();
        assert!(dispatcher.emit("heartbeat", json!({})).await);

        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.stats().listener_timeouts, 1);
    }

    #[test]
    fn test_total_capacity() {
        let dispatcher = EventDispatcher::new(EventsConfig {
            max_listeners: 2,
            ..EventsConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()).unwrap();
        dispatcher.subscribe("b", counter_listener(&counter), SubscribeOptions::default()).unwrap();
        let result = dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default());

        assert!(matches!(result, Err(DispatchError::CapacityExceeded { max: 2 })));
        assert!(!dispatcher.get_health_status().healthy);
    }

    #[test]
    fn test_event_name_capacity() {
        let dispatcher = EventDispatcher::new(EventsConfig {
            max_listeners: 1,
            listener_capacity: ListenerCapacity::EventNames,
            ..EventsConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()).unwrap();
        dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()).unwrap();
        let result = dispatcher.subscribe("b", counter_listener(&counter), SubscribeOptions::default());

        assert!(matches!(result, Err(DispatchError::CapacityExceeded { max: 1 })));
        assert_eq!(dispatcher.listener_count(None), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = dispatcher
            .subscribe("a", counter_listener(&counter), SubscribeOptions::default())
            .unwrap();
        dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()).unwrap();
        dispatcher.subscribe("b", counter_listener(&counter), SubscribeOptions::default()).unwrap();

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.unsubscribe_all(Some("a")), 1);
        assert_eq!(dispatcher.event_names(), vec!["b".to_string()]);
        assert_eq!(dispatcher.unsubscribe_all(None), 1);
        assert_eq!(dispatcher.listener_count(None), 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dispatcher = EventDispatcher::new(EventsConfig {
            history_size: 3,
            ..EventsConfig::default()
        });

        for i in 0..5 {
            dispatcher.emit("tick", json!(i)).await;
        }

        let history = dispatcher.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].data, json!(2));
        assert_eq!(history[2].data, json!(4));
        assert_eq!(dispatcher.stats().total_emitted, 5);
    }

    #[tokio::test]
    async fn test_closed_dispatcher() {
        let dispatcher = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()).unwrap();

        assert_eq!(dispatcher.close(), 1);

        assert!(!dispatcher.emit("a", json!({})).await);
        assert!(matches!(
            dispatcher.subscribe("a", counter_listener(&counter), SubscribeOptions::default()),
            Err(DispatchError::Closed)
        ));
        assert!(!dispatcher.get_health_status().healthy);

        dispatcher.reopen();
        assert!(dispatcher.emit("a", json!({})).await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
