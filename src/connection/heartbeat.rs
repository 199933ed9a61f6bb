use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::ConnectionMetrics;

use super::manager::ManagerInner;
use super::state::ConnectionEvent;

/// Per-link heartbeat: pings on every interval and waits for the matching pong.
///
/// A missing pong force-closes the link through the manager, which then runs
/// the reconnection logic. The task ends when the link is cancelled.
pub(super) struct HeartbeatTask {
    inner: Arc<ManagerInner>,
    epoch: u64,
    pongs: mpsc::UnboundedReceiver<i64>,
    cancel: CancellationToken,
}

impl HeartbeatTask {
    pub(super) fn new(
        inner: Arc<ManagerInner>,
        epoch: u64,
        pongs: mpsc::UnboundedReceiver<i64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            epoch,
            pongs,
            cancel,
        }
    }

    pub(super) async fn run(mut self) {
        let config = self.inner.config().clone();
        let pong_timeout = config.pong_timeout();
        let mut ticker = interval(config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip immediate first tick
        ticker.tick().await;

        tracing::debug!(
            epoch = self.epoch,
            heartbeat_interval_ms = config.heartbeat_interval_ms,
            pong_timeout_ms = config.pong_timeout_ms,
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sent_at = Utc::now().timestamp_millis();
            let started = Instant::now();

            if let Err(e) = self
                .inner
                .transport()
                .send("ping", json!({ "timestamp": sent_at }))
                .await
            {
                tracing::warn!(error = %e, "Failed to send heartbeat ping");
            }

            let pongs = &mut self.pongs;
            let wait_for_pong = async move {
                while let Some(timestamp) = pongs.recv().await {
                    if timestamp >= sent_at {
                        return true;
                    }
                }
                false
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = timeout(pong_timeout, wait_for_pong) => match result {
                    Ok(true) => {
                        let latency_ms = started.elapsed().as_millis() as u64;
                        ConnectionMetrics::record_heartbeat_latency_ms(latency_ms);
                        tracing::trace!(latency_ms, "Heartbeat pong received");
                        self.inner.publish(ConnectionEvent::HeartbeatLatency { latency_ms });
                    }
                    // Reader finished, the link is already gone
                    Ok(false) => break,
                    Err(_) => {
                        tracing::warn!(
                            pong_timeout_ms = config.pong_timeout_ms,
                            "Heartbeat timed out, closing connection"
                        );
                        ConnectionMetrics::record_heartbeat_timeout();
                        self.inner.publish(ConnectionEvent::HeartbeatTimeout);
                        self.inner.connection_lost(self.epoch, "heartbeat timeout").await;
                        break;
                    }
                }
            }
        }

        tracing::debug!(epoch = self.epoch, "Heartbeat stopped");
    }
}
