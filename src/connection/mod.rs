//! Connection lifecycle: handshake, heartbeat and reconnection with backoff.

mod heartbeat;
mod manager;
mod state;

pub use manager::ConnectionManager;
pub use state::{ConnectionEvent, ConnectionState, ConnectionStatus};

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by the connection manager
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Authentication timed out after {timeout_ms}ms")]
    AuthTimeout { timeout_ms: u64 },

    #[error("Opening the transport timed out after {timeout_ms}ms")]
    OpenTimeout { timeout_ms: u64 },

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection attempt already in progress")]
    AlreadyConnecting,

    #[error("Missing user id or token")]
    MissingCredentials,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
