//! In-process loopback transport.
//!
//! [`MemoryTransport`] implements [`Transport`] without any network. A cloned
//! [`MemoryServer`] handle plays the backend: it decides how handshakes are
//! answered, records every outbound frame and can push inbound events or drop the
//! link at any time.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{AuthContext, InboundEvent, InboundReceiver, Transport, TransportError};

/// How the simulated backend answers a connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeBehavior {
    /// Acknowledge with a `connect` event
    Accept,
    /// Answer with `connect_error`
    Reject(String),
    /// Open the link but never acknowledge
    Silent,
    /// Fail to open the link at all
    Unreachable(String),
}

/// A frame written through the transport
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub event: String,
    pub payload: Value,
}

#[derive(Debug)]
struct MemoryState {
    inbound: Option<mpsc::UnboundedSender<InboundEvent>>,
    handshake: HandshakeBehavior,
    auto_pong: bool,
    fail_sends: bool,
    sent: Vec<SentFrame>,
    auth_log: Vec<AuthContext>,
    connect_attempts: usize,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            inbound: None,
            handshake: HandshakeBehavior::Accept,
            auto_pong: true,
            fail_sends: false,
            sent: Vec::new(),
            auth_log: Vec::new(),
            connect_attempts: 0,
        }
    }
}

/// Loopback transport for tests and offline development
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to script the simulated backend
    pub fn server(&self) -> MemoryServer {
        MemoryServer {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, url: &str, auth: &AuthContext) -> Result<InboundReceiver, TransportError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        state.auth_log.push(auth.clone());

        if let HandshakeBehavior::Unreachable(reason) = &state.handshake {
            tracing::debug!(url = %url, reason = %reason, "Memory transport unreachable");
            return Err(TransportError::Refused(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match &state.handshake {
            HandshakeBehavior::Accept => {
                let _ = tx.send(InboundEvent::Connect {
                    connection_id: Some(Uuid::new_v4().to_string()),
                });
            }
            HandshakeBehavior::Reject(message) => {
                let _ = tx.send(InboundEvent::ConnectError {
                    message: message.clone(),
                });
            }
            HandshakeBehavior::Silent | HandshakeBehavior::Unreachable(_) => {}
        }
        state.inbound = Some(tx);

        Ok(rx)
    }

    async fn disconnect(&self) {
        self.state.lock().inbound = None;
    }

    async fn send(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let Some(inbound) = state.inbound.clone() else {
            return Err(TransportError::NotConnected);
        };
        if state.fail_sends {
            return Err(TransportError::Protocol("send rejected".to_string()));
        }

        if event == "ping" && state.auto_pong {
            let timestamp = payload.get("timestamp").and_then(Value::as_i64).unwrap_or_default();
            let _ = inbound.send(InboundEvent::Pong { timestamp });
        }

        state.sent.push(SentFrame {
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Backend side of a [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryServer {
    /// Set how subsequent connection attempts are answered
    pub fn set_handshake(&self, behavior: HandshakeBehavior) {
        self.state.lock().handshake = behavior;
    }

    /// Answer pings automatically (enabled by default)
    pub fn set_auto_pong(&self, enabled: bool) {
        self.state.lock().auto_pong = enabled;
    }

    /// Make sends fail while the link stays open
    pub fn set_fail_sends(&self, enabled: bool) {
        self.state.lock().fail_sends = enabled;
    }

    /// Push an inbound event; returns false if no link is open
    pub fn push(&self, event: InboundEvent) -> bool {
        match &self.state.lock().inbound {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Push a business event
    pub fn push_message(&self, event: &str, data: Value) -> bool {
        self.push(InboundEvent::Message {
            event: event.to_string(),
            data,
        })
    }

    /// Close the link from the server side with a `disconnect` event
    pub fn drop_connection(&self, reason: &str) -> bool {
        let mut state = self.state.lock();
        match state.inbound.take() {
            Some(tx) => tx
                .send(InboundEvent::Disconnect {
                    reason: reason.to_string(),
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .inbound
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn auth_log(&self) -> Vec<AuthContext> {
        self.state.lock().auth_log.clone()
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    /// Frames sent with the given event name
    pub fn sent_events(&self, event: &str) -> Vec<SentFrame> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|frame| frame.event == event)
            .cloned()
            .collect()
    }
}
