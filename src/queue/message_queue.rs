use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::health::HealthStatus;
use crate::metrics::QueueMetrics;

use super::{MessageSender, Priority, QueueError, QueuedMessage};

/// Result of one processing tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued
    Idle,
    /// No sender installed yet
    NoSender,
    /// Inside the rate-limit window since the previous attempt
    RateLimited,
    /// Another tick is still in flight
    Busy,
    Sent { id: Uuid },
    /// Send failed; the message stays queued
    Retrying { id: Uuid, retry_count: u32 },
    /// Send failed and retries are exhausted
    Dropped { id: Uuid },
}

/// Clears the in-flight flag when a tick ends, even if its future is dropped
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    queue_full: AtomicU64,
    rate_limited: AtomicU64,
}

impl QueueCounters {
    fn reset(&self) {
        for counter in [
            &self.enqueued,
            &self.sent,
            &self.failed,
            &self.retries,
            &self.queue_full,
            &self.rate_limited,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Statistics about the outbound queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub size: usize,
    pub max_size: usize,
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub total_enqueued: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub queue_full: u64,
    pub rate_limited: u64,
}

/// Bounded priority queue for outbound messages.
///
/// # Design
///
/// - A new message is inserted before the first entry of strictly lower priority,
///   so delivery is by priority and FIFO within a tier
/// - At capacity new messages are rejected; nothing is evicted
/// - `process_next` sends at most one message per call and spaces attempts by
///   `rate_limit_ms`
pub struct MessageQueue {
    config: QueueConfig,
    messages: Mutex<VecDeque<QueuedMessage>>,
    sender: RwLock<Option<Arc<dyn MessageSender>>>,
    last_attempt: Mutex<Option<Instant>>,
    processing: AtomicBool,
    counters: QueueCounters,
}

impl MessageQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            messages: Mutex::new(VecDeque::new()),
            sender: RwLock::new(None),
            last_attempt: Mutex::new(None),
            processing: AtomicBool::new(false),
            counters: QueueCounters::default(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Install the sink used by `process_next`
    pub fn set_sender(&self, sender: Arc<dyn MessageSender>) {
        *self.sender.write() = Some(sender);
    }

    /// Queue a message; returns `false` when the queue is full
    pub fn enqueue(&self, event_name: &str, payload: Value, priority: Priority) -> bool {
        match self.try_enqueue(event_name, payload, priority) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(event = %event_name, priority = priority.as_str(), error = %e, "Message rejected");
                false
            }
        }
    }

    /// Queue a message, returning its id
    pub fn try_enqueue(&self, event_name: &str, payload: Value, priority: Priority) -> Result<Uuid, QueueError> {
        let mut messages = self.messages.lock();

        if messages.len() >= self.config.max_size {
            self.counters.queue_full.fetch_add(1, Ordering::Relaxed);
            QueueMetrics::record_rejected_full();
            return Err(QueueError::Full {
                max_size: self.config.max_size,
            });
        }

        let message = QueuedMessage::new(event_name, payload, priority, self.config.max_retries);
        let id = message.id;

        match messages.iter().position(|m| m.priority < priority) {
            Some(index) => messages.insert(index, message),
            None => messages.push_back(message),
        }

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        QueueMetrics::record_enqueued(priority.as_str());
        QueueMetrics::set_size(messages.len());

        tracing::debug!(
            message_id = %id,
            event = %event_name,
            priority = priority.as_str(),
            queue_size = messages.len(),
            "Message enqueued"
        );

        Ok(id)
    }

    /// Attempt delivery of the head message.
    ///
    /// This is the body of the periodic processing tick: at most one send per call.
    pub async fn process_next(&self) -> TickOutcome {
        if self.processing.swap(true, Ordering::AcqRel) {
            return TickOutcome::Busy;
        }
        let _guard = ProcessingGuard(&self.processing);
        self.process_head().await
    }

    async fn process_head(&self) -> TickOutcome {
        let Some(sender) = self.sender.read().clone() else {
            return TickOutcome::NoSender;
        };

        let Some(message) = self.messages.lock().front().cloned() else {
            return TickOutcome::Idle;
        };

        {
            let mut last_attempt = self.last_attempt.lock();
            let now = Instant::now();
            if let Some(last) = *last_attempt {
                if now.duration_since(last) < self.config.rate_limit() {
                    self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                    return TickOutcome::RateLimited;
                }
            }
            *last_attempt = Some(now);
        }

        match sender.send(&message).await {
            Ok(()) => {
                let size = self.remove(message.id);
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                QueueMetrics::set_size(size);
                tracing::debug!(
                    message_id = %message.id,
                    event = %message.event_name,
                    queue_size = size,
                    "Message sent"
                );
                TickOutcome::Sent { id: message.id }
            }
            Err(e) => self.record_failure(message.id, &e.to_string()),
        }
    }

    fn record_failure(&self, id: Uuid, error: &str) -> TickOutcome {
        let mut messages = self.messages.lock();
        let Some(index) = messages.iter().position(|m| m.id == id) else {
            // Cleared while the send was in flight
            return TickOutcome::Idle;
        };

        let message = &mut messages[index];
        message.retry_count += 1;
        let retry_count = message.retry_count;

        if retry_count >= message.max_retries {
            let dropped = QueueError::RetriesExhausted {
                id,
                attempts: retry_count,
            };
            messages.remove(index);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            QueueMetrics::record_dropped_retries();
            QueueMetrics::set_size(messages.len());
            tracing::warn!(error = %error, "{}", dropped);
            TickOutcome::Dropped { id }
        } else {
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            QueueMetrics::record_retry();
            tracing::debug!(
                message_id = %id,
                retry_count,
                error = %error,
                "Send failed, message kept for retry"
            );
            TickOutcome::Retrying { id, retry_count }
        }
    }

    /// Remove a message by id, returning the remaining size
    fn remove(&self, id: Uuid) -> usize {
        let mut messages = self.messages.lock();
        if let Some(index) = messages.iter().position(|m| m.id == id) {
            messages.remove(index);
        }
        messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.config.max_size
    }

    /// Queued messages in delivery order
    pub fn snapshot(&self) -> Vec<QueuedMessage> {
        self.messages.lock().iter().cloned().collect()
    }

    /// Drop every queued message, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut messages = self.messages.lock();
        let removed = messages.len();
        messages.clear();
        QueueMetrics::set_size(0);
        if removed > 0 {
            tracing::info!(removed, "Queue cleared");
        }
        removed
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    pub fn stats(&self) -> QueueStats {
        let (size, critical, high, normal, low) = {
            let messages = self.messages.lock();
            let count = |p: Priority| messages.iter().filter(|m| m.priority == p).count();
            (
                messages.len(),
                count(Priority::Critical),
                count(Priority::High),
                count(Priority::Normal),
                count(Priority::Low),
            )
        };

        QueueStats {
            size,
            max_size: self.config.max_size,
            critical,
            high,
            normal,
            low,
            total_enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            total_sent: self.counters.sent.load(Ordering::Relaxed),
            total_failed: self.counters.failed.load(Ordering::Relaxed),
            total_retries: self.counters.retries.load(Ordering::Relaxed),
            queue_full: self.counters.queue_full.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let stats = self.stats();

        let mut details = Map::new();
        details.insert("size".to_string(), json!(stats.size));
        details.insert("max_size".to_string(), json!(stats.max_size));
        details.insert("total_sent".to_string(), json!(stats.total_sent));
        details.insert("total_failed".to_string(), json!(stats.total_failed));
        details.insert("queue_full".to_string(), json!(stats.queue_full));
        details.insert(
            "has_sender".to_string(),
            json!(self.sender.read().is_some()),
        );

        HealthStatus::from_check(
            stats.size < stats.max_size,
            format!("queue is full ({}/{})", stats.size, stats.max_size),
            details,
        )
    }
}
