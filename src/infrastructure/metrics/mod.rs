//! Prometheus metrics for the realtime core.
//!
//! Collectors are exported through [`encode_metrics`] for an optional telemetry sink:
//! - Connection metrics (status, reconnection attempts, heartbeat latency)
//! - Message metrics (sent, received, queue admission and drops)
//! - Dispatch metrics (emissions, listener failures)
//! - Room metrics
//! - Monitor metrics (response time, uptime, error rate)

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DispatchMetrics, MessageMetrics, MonitorMetrics,
    QueueMetrics, RoomMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "realtime";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Connection status (0=disconnected, 1=connecting, 2=connected, 3=reconnecting)
    pub static ref CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_connection_status", METRIC_PREFIX),
        "Connection status (0=disconnected, 1=connecting, 2=connected, 3=reconnecting)"
    ).unwrap();

    /// Total reconnection attempts scheduled
    pub static ref RECONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_attempts_total", METRIC_PREFIX),
        "Total reconnection attempts scheduled"
    ).unwrap();

    /// Reconnection budgets exhausted
    pub static ref RECONNECT_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_failed_total", METRIC_PREFIX),
        "Total times the reconnection budget was exhausted"
    ).unwrap();

    /// Heartbeat round-trip latency
    pub static ref HEARTBEAT_LATENCY: Histogram = register_histogram!(
        format!("{}_heartbeat_latency_seconds", METRIC_PREFIX),
        "Heartbeat ping/pong round-trip latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();

    /// Heartbeats that did not receive a pong in time
    pub static ref HEARTBEAT_TIMEOUTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total heartbeat pong timeouts"
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages written to the transport
    pub static ref MESSAGES_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages sent over the transport"
    ).unwrap();

    /// Messages received from the transport
    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_received_total", METRIC_PREFIX),
        "Total messages received from the transport"
    ).unwrap();

    /// Errors recorded by kind
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_errors_total", METRIC_PREFIX),
        "Total errors by kind",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Current outbound queue depth
    pub static ref QUEUE_SIZE: IntGauge = register_int_gauge!(
        format!("{}_queue_size", METRIC_PREFIX),
        "Messages currently waiting in the outbound queue"
    ).unwrap();

    /// Messages accepted by priority
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total messages accepted into the outbound queue",
        &["priority"]
    ).unwrap();

    /// Messages rejected or dropped by reason
    pub static ref QUEUE_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_dropped_total", METRIC_PREFIX),
        "Total messages rejected or dropped from the outbound queue",
        &["reason"]
    ).unwrap();

    /// Failed send attempts that were kept for retry
    pub static ref QUEUE_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_retries_total", METRIC_PREFIX),
        "Total failed send attempts kept for retry"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Events emitted through the dispatcher
    pub static ref EVENTS_EMITTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_emitted_total", METRIC_PREFIX),
        "Total events emitted through the dispatcher"
    ).unwrap();

    /// Listener invocations that failed, by reason
    pub static ref LISTENER_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_listener_failures_total", METRIC_PREFIX),
        "Total listener invocations that failed",
        &["reason"]
    ).unwrap();

    /// Registered listeners
    pub static ref LISTENERS_REGISTERED: IntGauge = register_int_gauge!(
        format!("{}_listeners_registered", METRIC_PREFIX),
        "Number of registered event listeners"
    ).unwrap();

    // ============================================================================
    // Room Metrics
    // ============================================================================

    /// Currently joined rooms
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of currently joined rooms"
    ).unwrap();

    /// Inactive rooms purged by cleanup
    pub static ref ROOMS_PURGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_rooms_purged_total", METRIC_PREFIX),
        "Total inactive rooms purged"
    ).unwrap();

    // ============================================================================
    // Monitor Metrics
    // ============================================================================

    /// Response time samples recorded by the monitor
    pub static ref RESPONSE_TIME: Histogram = register_histogram!(
        format!("{}_response_time_seconds", METRIC_PREFIX),
        "Response time samples in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
    ).unwrap();

    /// Domain events recorded by kind
    pub static ref MONITOR_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_monitor_events_total", METRIC_PREFIX),
        "Total events recorded by the metrics monitor",
        &["kind"]
    ).unwrap();

    /// Accumulated connection uptime
    pub static ref CONNECTION_UPTIME_SECONDS: Gauge = register_gauge!(
        format!("{}_connection_uptime_seconds", METRIC_PREFIX),
        "Accumulated connection uptime in seconds"
    ).unwrap();

    /// Errors per hundred messages
    pub static ref ERROR_RATE_PERCENT: Gauge = register_gauge!(
        format!("{}_error_rate_percent", METRIC_PREFIX),
        "Errors as a percentage of sent and received messages"
    ).unwrap();
}
