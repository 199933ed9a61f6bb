//! Priority-ordered outbound message queue.
//!
//! Business actions and room intents are buffered here and drained one message per
//! processing tick through an injected [`MessageSender`], subject to rate limiting
//! and bounded retries.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = MessageQueue::new(settings.queue.clone());
//! queue.set_sender(Arc::new(ConnectionSender::new(connection, monitor)));
//!
//! queue.enqueue("triggerEmergency", json!({"rideId": "ride_42"}), Priority::Critical);
//! let outcome = queue.process_next().await;
//! ```

mod message_queue;

pub use message_queue::{MessageQueue, QueueStats, TickOutcome};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Delivery priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// A pending outbound message
#[derive(Debug, Clone, Serialize)]
pub struct QueuedMessage {
    pub id: Uuid,
    pub event_name: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub priority: Priority,
    /// Failed send attempts so far
    pub retry_count: u32,
    pub max_retries: u32,
}

impl QueuedMessage {
    pub fn new(event_name: impl Into<String>, payload: Value, priority: Priority, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_name: event_name.into(),
            payload,
            enqueued_at: Utc::now(),
            priority,
            retry_count: 0,
            max_retries,
        }
    }
}

/// Error reported by a [`MessageSender`]; every variant is retryable
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    Failed(String),
}

/// Queue-side failures; logged and counted, never returned to callers of `enqueue`
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Queue full (max size: {max_size})")]
    Full { max_size: usize },

    #[error("Message {id} dropped after {attempts} failed attempts")]
    RetriesExhausted { id: Uuid, attempts: u32 },
}

/// Delivers a queued message to the wire
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &QueuedMessage) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(serde_json::to_value(Priority::Critical).unwrap(), "critical");
    }
}
