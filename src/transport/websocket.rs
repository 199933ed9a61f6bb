//! WebSocket transport over `tokio-tungstenite`.
//!
//! Frames are JSON envelopes `{"event": <name>, "data": <payload>}`. The first
//! outbound frame is `auth` carrying the [`AuthContext`]; the server acknowledges
//! with `connect` or refuses with `connect_error`.

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{AuthContext, InboundEvent, InboundReceiver, Transport, TransportError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Serialize an outbound frame
pub fn encode_frame(event: &str, payload: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        event: event.to_string(),
        data: payload.clone(),
    })
}

/// Parse an inbound text frame into a transport event
pub fn decode_frame(text: &str) -> Result<InboundEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data = envelope.data;

    let event = match envelope.event.as_str() {
        "connect" => InboundEvent::Connect {
            connection_id: data
                .get("id")
                .or_else(|| data.get("sid"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "disconnect" => InboundEvent::Disconnect {
            reason: string_field(&data, "reason").unwrap_or_else(|| "server disconnect".to_string()),
        },
        "connect_error" => InboundEvent::ConnectError {
            message: string_field(&data, "message").unwrap_or_else(|| "connection refused".to_string()),
        },
        "pong" => InboundEvent::Pong {
            timestamp: data.get("timestamp").and_then(Value::as_i64).unwrap_or_default(),
        },
        _ => InboundEvent::Message {
            event: envelope.event,
            data,
        },
    };

    Ok(event)
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        _ => data.get(key).and_then(Value::as_str).map(str::to_string),
    }
}

/// WebSocket adapter holding a single link
#[derive(Default)]
pub struct WebSocketTransport {
    sink: Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn backend_type(&self) -> &'static str {
        "websocket"
    }

    #[tracing::instrument(name = "transport.websocket.connect", skip(self, auth), fields(user_id = %auth.user_id))]
    async fn connect(&self, url: &str, auth: &AuthContext) -> Result<InboundReceiver, TransportError> {
        // Only one link at a time
        self.disconnect().await;

        let (ws_stream, _response) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let auth_frame = encode_frame("auth", &serde_json::to_value(auth)?)?;
        write.send(Message::Text(auth_frame.into())).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break "receiver dropped".to_string();
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to decode inbound frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "transport close".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("transport error: {e}"),
                    None => break "transport close".to_string(),
                }
            };
            tracing::debug!(reason = %reason, "WebSocket reader finished");
            let _ = tx.send(InboundEvent::Disconnect { reason });
        });

        *self.sink.lock().await = Some(write);
        *self.reader.lock().await = Some(reader);

        tracing::info!(url = %url, "WebSocket link opened");
        Ok(rx)
    }

    async fn disconnect(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "WebSocket close failed");
            }
        }
    }

    async fn send(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let frame = encode_frame(event, &payload)?;
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(frame.into())).await?;
        Ok(())
    }
}
