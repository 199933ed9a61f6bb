//! Transport factory

use std::sync::Arc;

use crate::config::TransportConfig;

use super::memory::MemoryTransport;
use super::websocket::WebSocketTransport;
use super::Transport;

/// Create a transport based on configuration.
///
/// Returns the appropriate adapter based on the `backend` setting:
/// - `"memory"`: Returns a loopback `MemoryTransport`
/// - `"websocket"` (default): Returns a `WebSocketTransport`
///
/// # Example
///
/// ```rust,ignore
/// let transport = create_transport(&settings.transport);
/// let service = RealtimeService::new(settings, transport);
/// ```
pub fn create_transport(settings: &TransportConfig) -> Arc<dyn Transport> {
    match settings.backend.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory transport");
            Arc::new(MemoryTransport::new())
        }
        "websocket" => {
            tracing::info!(backend = "websocket", "Creating WebSocket transport");
            Arc::new(WebSocketTransport::new())
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown transport backend requested, falling back to websocket"
            );
            Arc::new(WebSocketTransport::new())
        }
    }
}
