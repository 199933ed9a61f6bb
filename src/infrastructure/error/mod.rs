use thiserror::Error;

use crate::connection::ConnectionError;
use crate::events::DispatchError;
use crate::rooms::RoomError;
use crate::telemetry::TelemetryError;
use crate::transport::TransportError;

/// Crate-level error aggregating the component error types.
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Service not initialized")]
    NotInitialized,
}

impl RealtimeError {
    /// Stable machine-readable code, used in health details and logs
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::Config(_) => "CONFIG_ERROR",
            RealtimeError::Connection(_) => "CONNECTION_ERROR",
            RealtimeError::Transport(_) => "TRANSPORT_ERROR",
            RealtimeError::Dispatch(_) => "DISPATCH_ERROR",
            RealtimeError::Room(_) => "ROOM_ERROR",
            RealtimeError::Telemetry(_) => "TELEMETRY_ERROR",
            RealtimeError::NotInitialized => "NOT_INITIALIZED",
        }
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
