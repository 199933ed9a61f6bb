//! Performance and health metrics.
//!
//! [`MetricsMonitor`] aggregates message counters, a rolling latency window, error
//! rate and connection uptime, classifies them against fixed thresholds and mirrors
//! every record into the Prometheus collectors.

mod performance;
mod thresholds;

pub use performance::MetricsMonitor;
pub use thresholds::{AlertLevel, ThresholdAlert, ThresholdReport};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate performance counters
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub connection_uptime_ms: u64,
    pub average_response_time_ms: f64,
    pub error_rate_percent: f64,
    pub last_updated: DateTime<Utc>,
}

/// A recorded error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// Detailed view for diagnostics and service status
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStats {
    pub metrics: PerformanceMetrics,
    pub p95_response_time_ms: f64,
    pub latency_samples: usize,
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub events_by_kind: BTreeMap<String, u64>,
    /// Errors within the retention period, oldest first
    pub recent_errors: Vec<ErrorRecord>,
    pub connected: bool,
    pub connection_count: u64,
    /// Share of time connected since the first connection, if any
    pub uptime_ratio_percent: Option<f64>,
}
