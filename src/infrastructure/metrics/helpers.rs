//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTION_STATUS, CONNECTION_UPTIME_SECONDS, ERRORS_TOTAL, ERROR_RATE_PERCENT,
    EVENTS_EMITTED_TOTAL, HEARTBEAT_LATENCY, HEARTBEAT_TIMEOUTS_TOTAL, LISTENERS_REGISTERED,
    LISTENER_FAILURES_TOTAL, MESSAGES_RECEIVED_TOTAL, MESSAGES_SENT_TOTAL, MONITOR_EVENTS_TOTAL,
    QUEUE_DROPPED_TOTAL, QUEUE_ENQUEUED_TOTAL, QUEUE_RETRIES_TOTAL, QUEUE_SIZE,
    RECONNECT_ATTEMPTS_TOTAL, RECONNECT_FAILED_TOTAL, RESPONSE_TIME, ROOMS_ACTIVE,
    ROOMS_PURGED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Set the current connection status code
    pub fn set_status(code: i64) {
        CONNECTION_STATUS.set(code);
    }

    /// Record a scheduled reconnection attempt
    pub fn record_reconnect_attempt() {
        RECONNECT_ATTEMPTS_TOTAL.inc();
    }

    /// Record an exhausted reconnection budget
    pub fn record_reconnect_failed() {
        RECONNECT_FAILED_TOTAL.inc();
    }

    /// Record a heartbeat round trip
    pub fn record_heartbeat_latency_ms(latency_ms: u64) {
        HEARTBEAT_LATENCY.observe(latency_ms as f64 / 1000.0);
    }

    /// Record a heartbeat without a pong
    pub fn record_heartbeat_timeout() {
        HEARTBEAT_TIMEOUTS_TOTAL.inc();
    }
}

/// Helper struct for recording message traffic
pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_sent() {
        MESSAGES_SENT_TOTAL.inc();
    }

    pub fn record_received() {
        MESSAGES_RECEIVED_TOTAL.inc();
    }

    pub fn record_error(kind: &str) {
        ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording outbound queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn set_size(size: usize) {
        QUEUE_SIZE.set(size as i64);
    }

    pub fn record_enqueued(priority: &str) {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&[priority]).inc();
    }

    /// Record a message rejected because the queue is full
    pub fn record_rejected_full() {
        QUEUE_DROPPED_TOTAL.with_label_values(&["queue_full"]).inc();
    }

    /// Record a message dropped after exhausting its retries
    pub fn record_dropped_retries() {
        QUEUE_DROPPED_TOTAL.with_label_values(&["retries_exhausted"]).inc();
    }

    pub fn record_retry() {
        QUEUE_RETRIES_TOTAL.inc();
    }
}

/// Helper struct for recording dispatcher metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_emitted() {
        EVENTS_EMITTED_TOTAL.inc();
    }

    pub fn record_listener_error() {
        LISTENER_FAILURES_TOTAL.with_label_values(&["error"]).inc();
    }

    pub fn record_listener_timeout() {
        LISTENER_FAILURES_TOTAL.with_label_values(&["timeout"]).inc();
    }

    pub fn record_listener_panic() {
        LISTENER_FAILURES_TOTAL.with_label_values(&["panic"]).inc();
    }

    pub fn set_listeners(count: usize) {
        LISTENERS_REGISTERED.set(count as i64);
    }
}

/// Helper struct for recording room metrics
pub struct RoomMetrics;

impl RoomMetrics {
    pub fn set_active(count: usize) {
        ROOMS_ACTIVE.set(count as i64);
    }

    pub fn record_purged(count: usize) {
        ROOMS_PURGED_TOTAL.inc_by(count as u64);
    }
}

/// Helper struct for mirroring monitor values
pub struct MonitorMetrics;

impl MonitorMetrics {
    pub fn record_response_time_ms(latency_ms: f64) {
        RESPONSE_TIME.observe(latency_ms / 1000.0);
    }

    pub fn record_event(kind: &str) {
        MONITOR_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn set_uptime_ms(uptime_ms: u64) {
        CONNECTION_UPTIME_SECONDS.set(uptime_ms as f64 / 1000.0);
    }

    pub fn set_error_rate(percent: f64) {
        ERROR_RATE_PERCENT.set(percent);
    }
}
