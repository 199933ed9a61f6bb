//! Connection state and lifecycle event types

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Connection lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }
}

/// Snapshot of the connection state
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub connection_id: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected: None,
            last_disconnected: None,
            reconnect_attempts: 0,
            connection_id: None,
        }
    }
}

/// Lifecycle and inbound events published by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake acknowledged; `resumed` is set when a reconnection succeeded
    Connected {
        connection_id: String,
        resumed: bool,
    },
    Disconnected {
        reason: String,
    },
    ConnectError {
        message: String,
    },
    Reconnecting {
        attempt: u32,
        delay_ms: u64,
    },
    /// Terminal: no further attempts until `connect` is called again
    ReconnectFailed {
        attempts: u32,
    },
    HeartbeatLatency {
        latency_ms: u64,
    },
    HeartbeatTimeout,
    /// Business event received from the backend
    Message {
        event: String,
        data: Value,
    },
}

impl ConnectionEvent {
    /// Event name used when forwarding into the dispatcher
    pub fn name(&self) -> &str {
        match self {
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::Disconnected { .. } => "disconnected",
            ConnectionEvent::ConnectError { .. } => "connect_error",
            ConnectionEvent::Reconnecting { .. } => "reconnecting",
            ConnectionEvent::ReconnectFailed { .. } => "reconnect_failed",
            ConnectionEvent::HeartbeatLatency { .. } => "heartbeat",
            ConnectionEvent::HeartbeatTimeout => "heartbeat_timeout",
            ConnectionEvent::Message { event, .. } => event,
        }
    }

    /// JSON payload used when forwarding into the dispatcher
    pub fn payload(&self) -> Value {
        match self {
            ConnectionEvent::Connected {
                connection_id,
                resumed,
            } => json!({ "connectionId": connection_id, "resumed": resumed }),
            ConnectionEvent::Disconnected { reason } => json!({ "reason": reason }),
            ConnectionEvent::ConnectError { message } => json!({ "message": message }),
            ConnectionEvent::Reconnecting { attempt, delay_ms } => {
                json!({ "attempt": attempt, "delayMs": delay_ms })
            }
            ConnectionEvent::ReconnectFailed { attempts } => json!({ "attempts": attempts }),
            ConnectionEvent::HeartbeatLatency { latency_ms } => json!({ "latencyMs": latency_ms }),
            ConnectionEvent::HeartbeatTimeout => Value::Null,
            ConnectionEvent::Message { data, .. } => data.clone(),
        }
    }
}
