//! Transport abstraction for the realtime connection.
//!
//! The [`Transport`] trait is the only seam through which the connection manager
//! touches the wire. Two adapters are provided:
//! - `websocket`: JSON envelopes over `tokio-tungstenite`
//! - `memory`: in-process loopback driven by a [`MemoryServer`] handle

mod factory;
mod memory;
mod websocket;

pub use factory::create_transport;
pub use memory::{HandshakeBehavior, MemoryServer, MemoryTransport, SentFrame};
pub use websocket::{decode_frame, encode_frame, WebSocketTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Authentication context attached to the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub token: String,
    pub user_id: String,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }
}

/// Events surfaced by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Handshake acknowledged by the server
    Connect { connection_id: Option<String> },
    /// Server or network closed the link
    Disconnect { reason: String },
    /// Server rejected the handshake or reported a link error
    ConnectError { message: String },
    /// Heartbeat reply
    Pong { timestamp: i64 },
    /// Business-domain event
    Message { event: String, data: Value },
}

/// Receiving half of an open transport link
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Errors raised by transport adapters
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Narrow interface over the wire library.
///
/// A transport holds at most one link. `connect` opens it and returns the stream
/// of inbound events; the stream ends when the link closes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Adapter name, used in logs and health details
    fn backend_type(&self) -> &'static str;

    /// Open the link, attaching the authentication context
    async fn connect(&self, url: &str, auth: &AuthContext) -> Result<InboundReceiver, TransportError>;

    /// Close the link; a no-op when already closed
    async fn disconnect(&self);

    /// Send one event frame
    async fn send(&self, event: &str, payload: Value) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_context_wire_format() {
        let auth = AuthContext::new("driver-7", "secret-token");
        let json = serde_json::to_value(&auth).unwrap();

        assert_eq!(json["userId"], "driver-7");
        assert_eq!(json["token"], "secret-token");
    }
}
