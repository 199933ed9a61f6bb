use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level configuration for the realtime core.
///
/// Every section carries serde defaults, so a partial configuration (file or
/// environment) is merged over the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Realtime endpoint
    #[serde(default = "default_url")]
    pub url: String,
    /// Timeout for opening the transport in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive reconnection attempts before giving up
    #[serde(default = "default_connection_max_retries")]
    pub max_retries: u32,
    /// Base reconnection delay in milliseconds (doubled per attempt)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for a single reconnection delay in milliseconds
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Jitter factor applied to reconnection delays (0.0 to 1.0)
    #[serde(default)]
    pub reconnect_jitter: f64,
    /// Interval between heartbeat pings in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Maximum wait for a pong in milliseconds
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    /// Maximum wait for the handshake acknowledgement in milliseconds
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending outbound messages
    #[serde(default = "default_queue_max_size")]
    pub max_size: usize,
    /// Processing tick interval in milliseconds
    #[serde(default = "default_processing_interval_ms")]
    pub processing_interval_ms: u64,
    /// Minimum spacing between two send attempts in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    /// Send attempts per message before it is dropped
    #[serde(default = "default_queue_max_retries")]
    pub max_retries: u32,
}

/// Unit the listener capacity guard counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerCapacity {
    /// Total registered listeners across all events
    #[default]
    Total,
    /// Distinct event names with at least one listener
    EventNames,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
    /// Per-listener emit timeout in milliseconds
    #[serde(default = "default_emit_timeout_ms")]
    pub emit_timeout_ms: u64,
    /// Number of recent emissions retained for diagnostics
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub listener_capacity: ListenerCapacity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Metrics tick interval in milliseconds
    #[serde(default = "default_metrics_interval_ms")]
    pub interval_ms: u64,
    /// How long recorded errors are kept in the recent-error log
    #[serde(default = "default_retention_period_ms")]
    pub retention_period_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// Interval of the inactive-room purge in milliseconds
    #[serde(default = "default_room_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Inactive rooms older than this are purged
    #[serde(default = "default_max_inactive_age_ms")]
    pub max_inactive_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Transport adapter: "websocket" or "memory"
    #[serde(default = "default_transport_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otel_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_url() -> String {
    "ws://localhost:8080/realtime".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_connection_max_retries() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_pong_timeout_ms() -> u64 {
    5_000
}

fn default_auth_timeout_ms() -> u64 {
    5_000
}

fn default_queue_max_size() -> usize {
    50
}

fn default_processing_interval_ms() -> u64 {
    100
}

fn default_rate_limit_ms() -> u64 {
    100
}

fn default_queue_max_retries() -> u32 {
    3
}

fn default_max_listeners() -> usize {
    100
}

fn default_emit_timeout_ms() -> u64 {
    5_000
}

fn default_history_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_metrics_interval_ms() -> u64 {
    60_000 // 1 minute
}

fn default_retention_period_ms() -> u64 {
    3_600_000 // 1 hour
}

fn default_room_cleanup_interval_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_max_inactive_age_ms() -> u64 {
    3_600_000
}

fn default_transport_backend() -> String {
    "websocket".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "marketplace-realtime".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    /// Load settings from `config/default`, `config/{RUN_MODE}` and
    /// `REALTIME_*` environment variables (e.g. `REALTIME_CONNECTION__URL`).
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("REALTIME")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the background timers cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("connection.heartbeat_interval_ms", self.connection.heartbeat_interval_ms),
            ("queue.processing_interval_ms", self.queue.processing_interval_ms),
            ("metrics.interval_ms", self.metrics.interval_ms),
            ("rooms.cleanup_interval_ms", self.rooms.cleanup_interval_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Message(format!("{key} must be greater than 0")));
            }
        }
        Ok(())
    }
}

/// Timer periods never go below 1ms; `tokio::time::interval` rejects zero
fn timer_period(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        timer_period(self.heartbeat_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

impl QueueConfig {
    pub fn processing_interval(&self) -> Duration {
        timer_period(self.processing_interval_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

impl EventsConfig {
    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        timer_period(self.interval_ms)
    }

    pub fn retention_period(&self) -> Duration {
        Duration::from_millis(self.retention_period_ms)
    }
}

impl RoomsConfig {
    pub fn cleanup_interval(&self) -> Duration {
        timer_period(self.cleanup_interval_ms)
    }

    pub fn max_inactive_age(&self) -> Duration {
        Duration::from_millis(self.max_inactive_age_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_ms: default_connection_timeout_ms(),
            max_retries: default_connection_max_retries(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            reconnect_jitter: 0.0,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: default_queue_max_size(),
            processing_interval_ms: default_processing_interval_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            max_retries: default_queue_max_retries(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
            emit_timeout_ms: default_emit_timeout_ms(),
            history_size: default_history_size(),
            listener_capacity: ListenerCapacity::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_metrics_interval_ms(),
            retention_period_ms: default_retention_period_ms(),
        }
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_room_cleanup_interval_ms(),
            max_inactive_age_ms: default_max_inactive_age_ms(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_transport_backend(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_otel_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
