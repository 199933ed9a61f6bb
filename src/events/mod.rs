//! In-process event dispatcher.
//!
//! Listeners subscribe by event name with an optional priority and a `once` flag.
//! `emit` runs every matching listener concurrently on the calling task, each raced
//! against the configured emit timeout; a failing, panicking or slow listener never
//! affects the others.

mod dispatcher;

pub use dispatcher::{DispatcherStatsSnapshot, EmitRecord, EventDispatcher};

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Identifies a registered listener
pub type ListenerId = Uuid;

/// Future returned by a listener callback
pub type ListenerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased listener callback
pub type ListenerCallback = Arc<dyn Fn(Value) -> ListenerFuture + Send + Sync>;

/// A registered listener
#[derive(Clone)]
pub struct Listener {
    pub id: ListenerId,
    pub event_name: String,
    pub callback: ListenerCallback,
    pub once: bool,
    pub priority: i32,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("event_name", &self.event_name)
            .field("once", &self.once)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Options for [`EventDispatcher::subscribe`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Detach after the first emission that picks the listener up
    pub once: bool,
    /// Higher runs first; ties keep subscription order
    pub priority: i32,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            priority: 0,
        }
    }

    pub fn with_priority(priority: i32) -> Self {
        Self {
            once: false,
            priority,
        }
    }
}

/// Dispatcher errors
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Listener capacity exceeded (max: {max})")]
    CapacityExceeded { max: usize },

    #[error("Dispatcher is closed")]
    Closed,

    #[error("Listener {listener_id} failed: {message}")]
    ListenerFailed { listener_id: ListenerId, message: String },

    #[error("Listener {listener_id} timed out after {timeout_ms}ms")]
    ListenerTimedOut { listener_id: ListenerId, timeout_ms: u64 },

    #[error("Listener {listener_id} panicked")]
    ListenerPanicked { listener_id: ListenerId },
}
