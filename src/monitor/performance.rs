use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map};
use tokio::time::Instant;

use crate::config::MetricsConfig;
use crate::health::HealthStatus;
use crate::metrics::{MessageMetrics, MonitorMetrics};

use super::{AlertLevel, DetailedStats, ErrorRecord, PerformanceMetrics, ThresholdReport};

/// Number of latency samples kept in the rolling window
const LATENCY_WINDOW: usize = 100;

struct MonitorState {
    messages_sent: u64,
    messages_received: u64,
    total_errors: u64,
    errors_by_kind: BTreeMap<String, u64>,
    events_by_kind: BTreeMap<String, u64>,
    latencies: VecDeque<f64>,
    average_latency_ms: f64,
    recent_errors: VecDeque<(Instant, ErrorRecord)>,
    accumulated_uptime: Duration,
    connected_since: Option<Instant>,
    first_connected: Option<Instant>,
    connection_count: u64,
    last_updated: DateTime<Utc>,
    last_tick: Instant,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            messages_sent: 0,
            messages_received: 0,
            total_errors: 0,
            errors_by_kind: BTreeMap::new(),
            events_by_kind: BTreeMap::new(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            average_latency_ms: 0.0,
            recent_errors: VecDeque::new(),
            accumulated_uptime: Duration::ZERO,
            connected_since: None,
            first_connected: None,
            connection_count: 0,
            last_updated: Utc::now(),
            last_tick: Instant::now(),
        }
    }

    fn uptime(&self) -> Duration {
        let open = self
            .connected_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.accumulated_uptime + open
    }

    fn error_rate_percent(&self) -> f64 {
        let traffic = self.messages_sent + self.messages_received;
        if traffic == 0 {
            return 0.0;
        }
        self.total_errors as f64 * 100.0 / traffic as f64
    }

    fn uptime_ratio_percent(&self) -> Option<f64> {
        let window = self.first_connected?.elapsed();
        if window.is_zero() {
            return Some(100.0);
        }
        Some((self.uptime().as_secs_f64() / window.as_secs_f64() * 100.0).min(100.0))
    }

    fn p95_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = (sorted.len() as f64 * 0.95).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }

    fn prune_errors(&mut self, retention: Duration) {
        while let Some((at, _)) = self.recent_errors.front() {
            if at.elapsed() < retention {
                break;
            }
            self.recent_errors.pop_front();
        }
    }

    fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            connection_uptime_ms: self.uptime().as_millis() as u64,
            average_response_time_ms: self.average_latency_ms,
            error_rate_percent: self.error_rate_percent(),
            last_updated: self.last_updated,
        }
    }
}

/// Aggregates counters, latency, error rate and uptime.
///
/// Recording always updates the in-memory state; `enabled` only controls the
/// staleness check in [`MetricsMonitor::get_health_status`] and whether the
/// periodic tick is scheduled.
pub struct MetricsMonitor {
    config: MetricsConfig,
    state: Mutex<MonitorState>,
}

impl MetricsMonitor {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::new()),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn record_message_sent(&self) {
        let rate = {
            let mut state = self.state.lock();
            state.messages_sent += 1;
            state.error_rate_percent()
        };
        MessageMetrics::record_sent();
        MonitorMetrics::set_error_rate(rate);
    }

    pub fn record_message_received(&self) {
        let rate = {
            let mut state = self.state.lock();
            state.messages_received += 1;
            state.error_rate_percent()
        };
        MessageMetrics::record_received();
        MonitorMetrics::set_error_rate(rate);
    }

    pub fn record_error(&self, kind: &str) {
        let rate = {
            let mut state = self.state.lock();
            state.total_errors += 1;
            *state.errors_by_kind.entry(kind.to_string()).or_default() += 1;
            state.recent_errors.push_back((
                Instant::now(),
                ErrorRecord {
                    kind: kind.to_string(),
                    timestamp: Utc::now(),
                },
            ));
            state.prune_errors(self.config.retention_period());
            state.error_rate_percent()
        };
        MessageMetrics::record_error(kind);
        MonitorMetrics::set_error_rate(rate);
        tracing::debug!(kind = %kind, error_rate = rate, "Error recorded");
    }

    pub fn record_event(&self, kind: &str) {
        *self
            .state
            .lock()
            .events_by_kind
            .entry(kind.to_string())
            .or_default() += 1;
        MonitorMetrics::record_event(kind);
    }

    /// Add a latency sample to the rolling window
    pub fn record_latency(&self, latency_ms: f64) {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            tracing::debug!(latency_ms, "Ignoring invalid latency sample");
            return;
        }

        {
            let mut state = self.state.lock();
            if state.latencies.len() >= LATENCY_WINDOW {
                state.latencies.pop_front();
            }
            state.latencies.push_back(latency_ms);
            state.average_latency_ms =
                state.latencies.iter().sum::<f64>() / state.latencies.len() as f64;
        }
        MonitorMetrics::record_response_time_ms(latency_ms);
    }

    /// Mark the start of a connected interval
    pub fn record_connection_start(&self) {
        let mut state = self.state.lock();
        if state.connected_since.is_some() {
            return;
        }
        let now = Instant::now();
        state.connected_since = Some(now);
        state.first_connected.get_or_insert(now);
        state.connection_count += 1;
    }

    /// Close the current connected interval, accumulating its duration
    pub fn record_connection_end(&self) {
        let uptime = {
            let mut state = self.state.lock();
            let Some(since) = state.connected_since.take() else {
                return;
            };
            state.accumulated_uptime += since.elapsed();
            state.accumulated_uptime
        };
        MonitorMetrics::set_uptime_ms(uptime.as_millis() as u64);
    }

    pub fn get_metrics(&self) -> PerformanceMetrics {
        self.state.lock().metrics()
    }

    pub fn get_detailed_stats(&self) -> DetailedStats {
        let mut state = self.state.lock();
        state.prune_errors(self.config.retention_period());

        DetailedStats {
            metrics: state.metrics(),
            p95_response_time_ms: state.p95_latency_ms(),
            latency_samples: state.latencies.len(),
            total_errors: state.total_errors,
            errors_by_kind: state.errors_by_kind.clone(),
            events_by_kind: state.events_by_kind.clone(),
            recent_errors: state
                .recent_errors
                .iter()
                .map(|(_, record)| record.clone())
                .collect(),
            connected: state.connected_since.is_some(),
            connection_count: state.connection_count,
            uptime_ratio_percent: state.uptime_ratio_percent(),
        }
    }

    /// Classify error rate, latency and uptime ratio
    pub fn check_thresholds(&self) -> ThresholdReport {
        let (error_rate, latency, uptime_ratio) = {
            let state = self.state.lock();
            (
                state.error_rate_percent(),
                state.average_latency_ms,
                state.uptime_ratio_percent(),
            )
        };
        ThresholdReport::evaluate(error_rate, latency, uptime_ratio)
    }

    /// Periodic update: re-stamp, prune and publish gauges
    pub fn tick(&self) -> ThresholdReport {
        let (uptime, rate) = {
            let mut state = self.state.lock();
            state.last_updated = Utc::now();
            state.last_tick = Instant::now();
            state.prune_errors(self.config.retention_period());
            (state.uptime(), state.error_rate_percent())
        };
        MonitorMetrics::set_uptime_ms(uptime.as_millis() as u64);
        MonitorMetrics::set_error_rate(rate);

        let report = self.check_thresholds();
        match report.level() {
            Some(AlertLevel::Critical) => {
                tracing::warn!(alerts = ?report.alerts, "Critical performance thresholds exceeded")
            }
            Some(AlertLevel::Warning) => {
                tracing::info!(alerts = ?report.alerts, "Performance thresholds exceeded")
            }
            None => {}
        }
        report
    }

    /// Clear all counters and samples; an open connection restarts its interval
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let connected = state.connected_since.is_some();
        *state = MonitorState::new();
        if connected {
            let now = Instant::now();
            state.connected_since = Some(now);
            state.first_connected = Some(now);
            state.connection_count = 1;
        }
        MonitorMetrics::set_error_rate(0.0);
        MonitorMetrics::set_uptime_ms(0);
        tracing::info!("Metrics reset");
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let (since_tick, metrics) = {
            let state = self.state.lock();
            (state.last_tick.elapsed(), state.metrics())
        };

        let mut details = Map::new();
        details.insert("enabled".to_string(), json!(self.config.enabled));
        details.insert("messages_sent".to_string(), json!(metrics.messages_sent));
        details.insert(
            "messages_received".to_string(),
            json!(metrics.messages_received),
        );
        details.insert(
            "error_rate_percent".to_string(),
            json!(metrics.error_rate_percent),
        );
        details.insert("last_updated".to_string(), json!(metrics.last_updated));

        if !self.config.enabled {
            return HealthStatus::healthy(details);
        }

        let stale_after = self.config.interval() * 2;
        HealthStatus::from_check(
            since_tick <= stale_after,
            format!(
                "metrics not updated for {}ms",
                since_tick.as_millis()
            ),
            details,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MetricsMonitor {
        MetricsMonitor::new(MetricsConfig::default())
    }

    #[test]
    fn test_error_rate_scenario() {
        let monitor = monitor();
        for _ in 0..10 {
            monitor.record_message_sent();
            monitor.record_message_received();
        }
        monitor.record_error("send_failed");
        monitor.record_error("heartbeat_timeout");

        let metrics = monitor.get_metrics();
        assert_eq!(metrics.error_rate_percent, 10.0);

        let report = monitor.check_thresholds();
        assert_eq!(report.level_for("error_rate"), Some(AlertLevel::Critical));
    }

    #[test]
    fn test_error_rate_without_traffic() {
        let monitor = monitor();
        monitor.record_error("connect_error");

        assert_eq!(monitor.get_metrics().error_rate_percent, 0.0);
        assert_eq!(monitor.get_detailed_stats().total_errors, 1);
    }

    #[test]
    fn test_latency_window() {
        let monitor = monitor();
        for i in 1..=150 {
            monitor.record_latency(i as f64);
        }

        let stats = monitor.get_detailed_stats();
        assert_eq!(stats.latency_samples, 100);
        // Window holds 51..=150
        assert_eq!(stats.metrics.average_response_time_ms, 100.5);
        assert_eq!(stats.p95_response_time_ms, 145.0);
    }

    #[test]
    fn test_invalid_latency_ignored() {
        let monitor = monitor();
        monitor.record_latency(f64::NAN);
        monitor.record_latency(-1.0);
        assert_eq!(monitor.get_detailed_stats().latency_samples, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_accumulates_intervals() {
        let monitor = monitor();

        monitor.record_connection_start();
        tokio::time::advance(Duration::from_secs(10)).await;
        monitor.record_connection_end();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(monitor.get_metrics().connection_uptime_ms, 10_000);
        let ratio = monitor.get_detailed_stats().uptime_ratio_percent.unwrap();
        assert!((ratio - 50.0).abs() < 0.01);
        assert_eq!(
            monitor.check_thresholds().level_for("uptime"),
            Some(AlertLevel::Warning)
        );

        monitor.record_connection_start();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(monitor.get_metrics().connection_uptime_ms, 15_000);
        assert_eq!(monitor.get_detailed_stats().connection_count, 2);
    }

    #[test]
    fn test_no_uptime_alert_before_first_connection() {
        let monitor = monitor();
        assert!(monitor.get_detailed_stats().uptime_ratio_percent.is_none());
        assert!(monitor.check_thresholds().alerts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_goes_stale_without_tick() {
        let monitor = MetricsMonitor::new(MetricsConfig {
            interval_ms: 1000,
            ..MetricsConfig::default()
        });
        assert!(monitor.get_health_status().healthy);

        tokio::time::advance(Duration::from_millis(2001)).await;
        assert!(!monitor.get_health_status().healthy);

        monitor.tick();
        assert!(monitor.get_health_status().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_monitor_is_always_healthy() {
        let monitor = MetricsMonitor::new(MetricsConfig {
            enabled: false,
            interval_ms: 1000,
            ..MetricsConfig::default()
        });

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(monitor.get_health_status().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_errors_pruned_after_retention() {
        let monitor = MetricsMonitor::new(MetricsConfig {
            retention_period_ms: 1000,
            ..MetricsConfig::default()
        });
        monitor.record_error("old");
        tokio::time::advance(Duration::from_millis(1500)).await;
        monitor.record_error("new");

        let stats = monitor.get_detailed_stats();
        assert_eq!(stats.recent_errors.len(), 1);
        assert_eq!(stats.recent_errors[0].kind, "new");
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.errors_by_kind["old"], 1);
    }

    #[test]
    fn test_events_and_reset() {
        let monitor = monitor();
        monitor.record_event("rideRequest");
        monitor.record_event("rideRequest");
        monitor.record_message_sent();
        monitor.record_connection_start();

        assert_eq!(monitor.get_detailed_stats().events_by_kind["rideRequest"], 2);

        monitor.reset();
        let stats = monitor.get_detailed_stats();
        assert!(stats.events_by_kind.is_empty());
        assert_eq!(stats.metrics.messages_sent, 0);
        assert!(stats.connected);
    }
}
