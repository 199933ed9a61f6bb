use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backoff::{BackoffConfig, ExponentialBackoff};
use crate::config::ConnectionConfig;
use crate::health::HealthStatus;
use crate::metrics::ConnectionMetrics;
use crate::transport::{AuthContext, InboundEvent, InboundReceiver, Transport};

use super::heartbeat::HeartbeatTask;
use super::state::{ConnectionEvent, ConnectionState, ConnectionStatus};
use super::ConnectionError;

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tasks scoped to one established link
struct ActiveLink {
    epoch: u64,
    cancel: CancellationToken,
}

/// Owns the single live connection to the realtime backend.
///
/// State transitions:
/// - `connect`: Disconnected -> Connecting -> Connected, or -> Reconnecting when the
///   handshake fails and attempts remain
/// - unexpected close or heartbeat timeout: Connected -> Reconnecting
/// - `disconnect` or exhausted attempts: any -> Disconnected
///
/// Lifecycle changes and inbound business events are published on a broadcast
/// channel, see [`ConnectionManager::subscribe`].
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

pub(super) struct ManagerInner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    backoff: ExponentialBackoff,
    state: RwLock<ConnectionState>,
    credentials: Mutex<Option<AuthContext>>,
    link: Mutex<Option<ActiveLink>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every handshake and teardown; stale signals carry an old value
    epoch: AtomicU64,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let backoff = ExponentialBackoff::with_config(BackoffConfig::from(&config));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                backoff,
                state: RwLock::new(ConnectionState::default()),
                credentials: Mutex::new(None),
                link: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                epoch: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Open an authenticated connection.
    ///
    /// Returns `Ok` once the server acknowledges the handshake, or immediately when
    /// already connected. On failure the error is returned and, if attempts remain,
    /// reconnection continues in the background.
    #[tracing::instrument(name = "connection.connect", skip(self, token))]
    pub async fn connect(&self, user_id: &str, token: &str) -> Result<(), ConnectionError> {
        if user_id.is_empty() || token.is_empty() {
            return Err(ConnectionError::MissingCredentials);
        }

        {
            let mut state = self.inner.state.write();
            match state.status {
                ConnectionStatus::Connected => {
                    tracing::debug!("Already connected");
                    return Ok(());
                }
                ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
                    return Err(ConnectionError::AlreadyConnecting);
                }
                ConnectionStatus::Disconnected => {
                    state.status = ConnectionStatus::Connecting;
                    state.reconnect_attempts = 0;
                }
            }
        }

        *self.inner.credentials.lock() = Some(AuthContext::new(user_id, token));
        ConnectionMetrics::set_status(ConnectionStatus::Connecting as i64);
        tracing::info!(url = %self.inner.config.url, "Connecting");

        let epoch = self.inner.next_epoch();
        match self.inner.establish(epoch, false).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Initial connection failed");
                self.inner.publish(ConnectionEvent::ConnectError {
                    message: e.to_string(),
                });
                self.inner.start_reconnect(Some(epoch));
                Err(e)
            }
        }
    }

    /// Close the connection and cancel heartbeat, reader and reconnection tasks
    pub async fn disconnect(&self) {
        let previous = self.inner.teardown(ConnectionStatus::Disconnected);
        if let Some(task) = self.inner.reconnect_task.lock().take() {
            task.abort();
        }
        self.inner.transport.disconnect().await;
        ConnectionMetrics::set_status(ConnectionStatus::Disconnected as i64);

        if previous != ConnectionStatus::Disconnected {
            tracing::info!(previous = previous.as_str(), "Disconnected by client");
            self.inner.publish(ConnectionEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    /// Drop the current link and handshake again with the stored credentials.
    ///
    /// The attempt counter is reset. On failure the backoff loop takes over and the
    /// error is returned.
    #[tracing::instrument(name = "connection.force_reconnect", skip(self))]
    pub async fn force_reconnect(&self) -> Result<(), ConnectionError> {
        if self.inner.credentials.lock().is_none() {
            return Err(ConnectionError::MissingCredentials);
        }
        if self.inner.state.read().status == ConnectionStatus::Connecting {
            return Err(ConnectionError::AlreadyConnecting);
        }

        if let Some(task) = self.inner.reconnect_task.lock().take() {
            task.abort();
        }
        let previous = self.inner.teardown(ConnectionStatus::Connecting);
        self.inner.transport.disconnect().await;
        ConnectionMetrics::set_status(ConnectionStatus::Connecting as i64);

        if previous == ConnectionStatus::Connected {
            self.inner.publish(ConnectionEvent::Disconnected {
                reason: "forced reconnect".to_string(),
            });
        }
        tracing::info!("Forcing reconnection");

        let epoch = self.inner.next_epoch();
        match self.inner.establish(epoch, true).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Forced reconnection failed");
                self.inner.publish(ConnectionEvent::ConnectError {
                    message: e.to_string(),
                });
                self.inner.start_reconnect(Some(epoch));
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.read().is_connected()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().clone()
    }

    /// Send one frame on the live link; fails fast when not connected
    pub async fn send(&self, event: &str, payload: Value) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        self.inner.transport.send(event, payload).await?;
        Ok(())
    }

    /// Receive lifecycle and inbound business events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let state = self.state();

        let mut details = Map::new();
        details.insert("status".to_string(), json!(state.status.as_str()));
        details.insert("connection_id".to_string(), json!(state.connection_id));
        details.insert(
            "reconnect_attempts".to_string(),
            json!(state.reconnect_attempts),
        );
        details.insert("last_connected".to_string(), json!(state.last_connected));
        details.insert(
            "last_disconnected".to_string(),
            json!(state.last_disconnected),
        );
        details.insert(
            "transport".to_string(),
            json!(self.inner.transport.backend_type()),
        );

        HealthStatus::from_check(
            state.is_connected(),
            format!("connection is {}", state.status.as_str()),
            details,
        )
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.teardown(ConnectionStatus::Disconnected);
        if let Some(task) = self.inner.reconnect_task.lock().take() {
            task.abort();
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.inner.transport.clone();
            handle.spawn(async move {
                transport.disconnect().await;
            });
        }
    }
}

impl ManagerInner {
    pub(super) fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub(super) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(super) fn publish(&self, event: ConnectionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Invalidate the current link and move to `next`; returns the previous status
    fn teardown(&self, next: ConnectionStatus) -> ConnectionStatus {
        let mut state = self.state.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(link) = self.link.lock().take() {
            link.cancel.cancel();
        }

        let previous = state.status;
        if previous == ConnectionStatus::Connected {
            state.last_disconnected = Some(Utc::now());
        }
        state.status = next;
        state.connection_id = None;
        state.reconnect_attempts = 0;
        previous
    }

    /// Reserve the epoch of a new handshake attempt
    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Open the transport and wait for the handshake acknowledgement.
    ///
    /// `epoch` comes from [`ManagerInner::next_epoch`]; the link is only committed
    /// if no teardown happened in between.
    async fn establish(self: &Arc<Self>, epoch: u64, resumed: bool) -> Result<(), ConnectionError> {
        let auth = self
            .credentials
            .lock()
            .clone()
            .ok_or(ConnectionError::MissingCredentials)?;

        let mut inbound = match timeout(
            self.config.timeout(),
            self.transport.connect(&self.config.url, &auth),
        )
        .await
        {
            Ok(Ok(inbound)) => inbound,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                self.transport.disconnect().await;
                return Err(ConnectionError::OpenTimeout {
                    timeout_ms: self.config.timeout_ms,
                });
            }
        };

        let connection_id =
            match timeout(self.config.auth_timeout(), wait_for_ack(&mut inbound)).await {
                Ok(Ok(id)) => id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                Ok(Err(e)) => {
                    self.transport.disconnect().await;
                    return Err(e);
                }
                Err(_) => {
                    self.transport.disconnect().await;
                    return Err(ConnectionError::AuthTimeout {
                        timeout_ms: self.config.auth_timeout_ms,
                    });
                }
            };

        let cancel = CancellationToken::new();
        let committed = {
            let mut state = self.state.write();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                false
            } else {
                state.status = ConnectionStatus::Connected;
                state.last_connected = Some(Utc::now());
                state.reconnect_attempts = 0;
                state.connection_id = Some(connection_id.clone());
                *self.link.lock() = Some(ActiveLink {
                    epoch,
                    cancel: cancel.clone(),
                });
                true
            }
        };

        if !committed {
            // Torn down while the handshake was in flight
            self.transport.disconnect().await;
            return Err(ConnectionError::Closed(
                "connection attempt cancelled".to_string(),
            ));
        }

        ConnectionMetrics::set_status(ConnectionStatus::Connected as i64);
        tracing::info!(connection_id = %connection_id, resumed, "Connected");
        self.publish(ConnectionEvent::Connected {
            connection_id,
            resumed,
        });

        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            self.clone()
                .read_link(epoch, inbound, pong_tx, cancel.clone()),
        );
        tokio::spawn(HeartbeatTask::new(self.clone(), epoch, pong_rx, cancel).run());

        Ok(())
    }

    /// Route inbound events of one link until it closes or is cancelled
    async fn read_link(
        self: Arc<Self>,
        epoch: u64,
        mut inbound: InboundReceiver,
        pongs: mpsc::UnboundedSender<i64>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = inbound.recv() => event,
            };

            match event {
                Some(InboundEvent::Message { event, data }) => {
                    tracing::debug!(event = %event, "Inbound event");
                    self.publish(ConnectionEvent::Message { event, data });
                }
                Some(InboundEvent::Pong { timestamp }) => {
                    let _ = pongs.send(timestamp);
                }
                Some(InboundEvent::ConnectError { message }) => {
                    tracing::warn!(message = %message, "Connection error reported by server");
                    self.publish(ConnectionEvent::ConnectError { message });
                }
                Some(InboundEvent::Connect { .. }) => {
                    tracing::debug!("Ignoring duplicate connect acknowledgement");
                }
                Some(InboundEvent::Disconnect { reason }) => {
                    self.connection_lost(epoch, &reason).await;
                    return;
                }
                None => {
                    self.connection_lost(epoch, "transport close").await;
                    return;
                }
            }
        }
    }

    /// Handle an unexpected loss of the link identified by `epoch`
    pub(super) async fn connection_lost(self: &Arc<Self>, epoch: u64, reason: &str) {
        let handled = {
            let mut state = self.state.write();
            let mut link = self.link.lock();
            let current = link.as_ref().map(|l| l.epoch);

            if current != Some(epoch) || state.status != ConnectionStatus::Connected {
                false
            } else {
                if let Some(link) = link.take() {
                    link.cancel.cancel();
                }
                state.status = ConnectionStatus::Reconnecting;
                state.last_disconnected = Some(Utc::now());
                state.connection_id = None;
                true
            }
        };

        if !handled {
            tracing::debug!(epoch, reason, "Ignoring signal from stale link");
            return;
        }

        self.transport.disconnect().await;
        tracing::warn!(reason, "Connection lost");
        self.publish(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });
        self.start_reconnect(None);
    }

    /// Hand over to the backoff loop, or give up when no retries are configured.
    ///
    /// With `failed_attempt`, the handshake of that epoch just failed; nothing is
    /// scheduled if a teardown has superseded it (e.g. a client `disconnect`).
    fn start_reconnect(self: &Arc<Self>, failed_attempt: Option<u64>) {
        let exhausted = {
            let mut state = self.state.write();
            if let Some(epoch) = failed_attempt {
                if state.status != ConnectionStatus::Connecting
                    || self.epoch.load(Ordering::SeqCst) != epoch
                {
                    tracing::debug!(epoch, "Handshake superseded, reconnection not scheduled");
                    return;
                }
            }

            if self.config.max_retries == 0 {
                state.status = ConnectionStatus::Disconnected;
                true
            } else {
                state.status = ConnectionStatus::Reconnecting;
                false
            }
        };

        if exhausted {
            ConnectionMetrics::set_status(ConnectionStatus::Disconnected as i64);
            ConnectionMetrics::record_reconnect_failed();
            self.publish(ConnectionEvent::ReconnectFailed { attempts: 0 });
            return;
        }

        ConnectionMetrics::set_status(ConnectionStatus::Reconnecting as i64);

        let inner = self.clone();
        let task = tokio::spawn(async move { inner.reconnect_loop().await });
        if let Some(previous) = self.reconnect_task.lock().replace(task) {
            previous.abort();
        }
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let max_retries = self.config.max_retries;

        loop {
            let attempt = {
                let mut state = self.state.write();
                if state.status != ConnectionStatus::Reconnecting {
                    return;
                }
                if state.reconnect_attempts >= max_retries {
                    state.status = ConnectionStatus::Disconnected;
                    None
                } else {
                    state.reconnect_attempts += 1;
                    Some(state.reconnect_attempts)
                }
            };

            let Some(attempt) = attempt else {
                ConnectionMetrics::set_status(ConnectionStatus::Disconnected as i64);
                ConnectionMetrics::record_reconnect_failed();
                tracing::error!(attempts = max_retries, "Reconnection attempts exhausted");
                self.publish(ConnectionEvent::ReconnectFailed {
                    attempts: max_retries,
                });
                return;
            };

            let delay = self.backoff.delay_for_attempt(attempt);
            let delay_ms = delay.as_millis() as u64;
            ConnectionMetrics::record_reconnect_attempt();
            tracing::info!(attempt, max_retries, delay_ms, "Scheduling reconnection");
            self.publish(ConnectionEvent::Reconnecting { attempt, delay_ms });

            tokio::time::sleep(delay).await;

            let epoch = self.next_epoch();
            match self.establish(epoch, true).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnection attempt failed");
                    self.publish(ConnectionEvent::ConnectError {
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Wait for the server to acknowledge or refuse the handshake
async fn wait_for_ack(inbound: &mut InboundReceiver) -> Result<Option<String>, ConnectionError> {
    while let Some(event) = inbound.recv().await {
        match event {
            InboundEvent::Connect { connection_id } => return Ok(connection_id),
            InboundEvent::ConnectError { message } => {
                return Err(ConnectionError::HandshakeRejected(message))
            }
            InboundEvent::Disconnect { reason } => return Err(ConnectionError::Closed(reason)),
            other => {
                tracing::debug!(event = ?other, "Ignoring event received before handshake");
            }
        }
    }
    Err(ConnectionError::Closed(
        "link closed during handshake".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::{HandshakeBehavior, MemoryServer, MemoryTransport};
    use tokio::time::Instant;

    fn config(max_retries: u32) -> ConnectionConfig {
        ConnectionConfig {
            url: "memory://realtime".to_string(),
            max_retries,
            ..ConnectionConfig::default()
        }
    }

    fn manager(max_retries: u32) -> (ConnectionManager, MemoryServer) {
        let transport = MemoryTransport::new();
        let server = transport.server();
        (
            ConnectionManager::new(config(max_retries), Arc::new(transport)),
            server,
        )
    }

    /// Wait for the first event matching `predicate`, skipping the others
    async fn wait_for<F>(rx: &mut broadcast::Receiver<ConnectionEvent>, predicate: F) -> ConnectionEvent
    where
        F: Fn(&ConnectionEvent) -> bool,
    {
        timeout(Duration::from_secs(600), async {
            loop {
                let event = rx.recv().await.unwrap();
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received")
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();

        manager.connect("driver-1", "token-1").await.unwrap();

        assert!(manager.is_connected());
        let state = manager.state();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert!(state.connection_id.is_some());
        assert!(state.last_connected.is_some());
        assert_eq!(server.auth_log(), vec![AuthContext::new("driver-1", "token-1")]);

        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Connected {
                connection_id: state.connection_id.unwrap(),
                resumed: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_when_connected_is_noop() {
        let (manager, server) = manager(5);

        manager.connect("driver-1", "token-1").await.unwrap();
        manager.connect("driver-1", "token-1").await.unwrap();

        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_requires_credentials() {
        let (manager, server) = manager(5);

        let result = manager.connect("", "token").await;

        assert!(matches!(result, Err(ConnectionError::MissingCredentials)));
        assert_eq!(server.connect_attempts(), 0);
        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_rejected() {
        let (manager, server) = manager(5);
        server.set_handshake(HandshakeBehavior::Reject("invalid token".to_string()));

        let result = manager.connect("driver-1", "bad-token").await;

        match result {
            Err(ConnectionError::HandshakeRejected(message)) => assert_eq!(message, "invalid token"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!manager.is_connected());
        assert_eq!(manager.state().status, ConnectionStatus::Reconnecting);

        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_timeout() {
        let (manager, server) = manager(0);
        server.set_handshake(HandshakeBehavior::Silent);

        let started = Instant::now();
        let result = manager.connect("driver-1", "token-1").await;

        assert!(matches!(
            result,
            Err(ConnectionError::AuthTimeout { timeout_ms: 5000 })
        ));
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);
        assert!(!server.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_terminal_failure() {
        let (manager, server) = manager(3);
        server.set_handshake(HandshakeBehavior::Unreachable("no route".to_string()));
        let mut events = manager.subscribe();

        assert!(manager.connect("driver-1", "token-1").await.is_err());

        let mut delays = Vec::new();
        loop {
            match wait_for(&mut events, |e| {
                matches!(
                    e,
                    ConnectionEvent::Reconnecting { .. } | ConnectionEvent::ReconnectFailed { .. }
                )
            })
            .await
            {
                ConnectionEvent::Reconnecting { attempt, delay_ms } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay_ms);
                }
                ConnectionEvent::ReconnectFailed { attempts } => {
                    assert_eq!(attempts, 3);
                    break;
                }
                _ => unreachable!(),
            }
        }

        assert_eq!(delays, vec![1000, 2000, 4000]);
        // Initial attempt plus three retries
        assert_eq!(server.connect_attempts(), 4);
        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_terminal_failure_resumes() {
        let (manager, server) = manager(1);
        server.set_handshake(HandshakeBehavior::Unreachable("no route".to_string()));
        let mut events = manager.subscribe();

        assert!(manager.connect("driver-1", "token-1").await.is_err());
        wait_for(&mut events, |e| matches!(e, ConnectionEvent::ReconnectFailed { .. })).await;

        server.set_handshake(HandshakeBehavior::Accept);
        manager.connect("driver-1", "token-1").await.unwrap();

        assert!(manager.is_connected());
        assert_eq!(manager.state().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_latency_reported() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();

        manager.connect("driver-1", "token-1").await.unwrap();

        let event = wait_for(&mut events, |e| {
            matches!(e, ConnectionEvent::HeartbeatLatency { .. })
        })
        .await;
        assert!(matches!(event, ConnectionEvent::HeartbeatLatency { .. }));
        assert_eq!(server.sent_events("ping").len(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_forces_reconnect() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();

        manager.connect("driver-1", "token-1").await.unwrap();
        server.set_auto_pong(false);

        wait_for(&mut events, |e| matches!(e, ConnectionEvent::HeartbeatTimeout)).await;
        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Disconnected {
                reason: "heartbeat timeout".to_string()
            }
        );

        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Reconnecting {
                attempt: 1,
                delay_ms: 1000
            }
        );

        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
        assert!(matches!(event, ConnectionEvent::Connected { resumed: true, .. }));
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_drop_triggers_reconnect() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();
        manager.connect("driver-1", "token-1").await.unwrap();

        assert!(server.drop_connection("server restart"));

        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Disconnected {
                reason: "server restart".to_string()
            }
        );
        wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connected { resumed: true, .. })).await;
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_business_event_published() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();
        manager.connect("driver-1", "token-1").await.unwrap();

        assert!(server.push_message("rideRequest", json!({"rideId": "ride_42"})));

        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Message { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Message {
                event: "rideRequest".to_string(),
                data: json!({"rideId": "ride_42"}),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_everything() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();
        manager.connect("driver-1", "token-1").await.unwrap();

        manager.disconnect().await;

        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);
        assert!(manager.state().last_disconnected.is_some());
        assert!(!server.is_open());
        assert!(matches!(
            manager.send("sendMessage", json!({})).await,
            Err(ConnectionError::NotConnected)
        ));
        let event = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert_eq!(
            event,
            ConnectionEvent::Disconnected {
                reason: "client disconnect".to_string()
            }
        );

        // No heartbeat or reconnection runs afterwards
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(server.connect_attempts(), 1);
        assert!(server.sent_events("ping").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_handshake_stays_disconnected() {
        let (manager, server) = manager(5);
        let manager = Arc::new(manager);
        server.set_handshake(HandshakeBehavior::Silent);

        let connecting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect("driver-1", "token-1").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.disconnect().await;

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Closed(_))));
        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);

        // A reachable server must not pull the client back in
        server.set_handshake(HandshakeBehavior::Accept);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.state().status, ConnectionStatus::Disconnected);
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reconnect() {
        let (manager, server) = manager(5);
        let mut events = manager.subscribe();
        manager.connect("driver-1", "token-1").await.unwrap();
        let first_id = manager.state().connection_id;

        manager.force_reconnect().await.unwrap();

        assert!(manager.is_connected());
        assert_ne!(manager.state().connection_id, first_id);
        assert_eq!(server.connect_attempts(), 2);
        wait_for(&mut events, |e| {
            matches!(e, ConnectionEvent::Disconnected { reason } if reason == "forced reconnect")
        })
        .await;
        wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connected { resumed: true, .. })).await;
    }

    #[tokio::test]
    async fn test_force_reconnect_without_credentials() {
        let (manager, _server) = manager(5);
        assert!(matches!(
            manager.force_reconnect().await,
            Err(ConnectionError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_health_before_connect() {
        let (manager, _server) = manager(5);

        let health = manager.get_health_status();

        assert!(!health.healthy);
        assert!(health.error.is_some());
        let details = health.details.unwrap();
        assert_eq!(details["status"], "disconnected");
        assert_eq!(details["transport"], "memory");
    }
}
