use std::sync::Arc;

use tokio::sync::broadcast;

use crate::monitor::MetricsMonitor;

/// Periodic metrics update and threshold check
pub struct MetricsTickTask {
    monitor: Arc<MetricsMonitor>,
    shutdown: broadcast::Receiver<()>,
}

impl MetricsTickTask {
    pub fn new(monitor: Arc<MetricsMonitor>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { monitor, shutdown }
    }

    /// Returns immediately when monitoring is disabled
    pub async fn run(mut self) {
        if !self.monitor.is_enabled() {
            tracing::debug!("Metrics monitoring disabled, tick task not started");
            return;
        }

        let interval = self.monitor.config().interval();
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        tracing::info!(interval_ms = interval.as_millis() as u64, "Metrics tick started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Metrics tick received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.monitor.tick();
                }
            }
        }

        tracing::info!("Metrics tick stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::MetricsConfig;

    #[tokio::test(start_paused = true)]
    async fn test_tick_keeps_monitor_fresh() {
        let monitor = Arc::new(MetricsMonitor::new(MetricsConfig::default()));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(MetricsTickTask::new(monitor.clone(), rx).run());

        tokio::time::sleep(Duration::from_secs(60 * 5 + 1)).await;
        assert!(monitor.get_health_status().healthy);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_monitor_returns_immediately() {
        let monitor = Arc::new(MetricsMonitor::new(MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        }));
        let (_tx, rx) = broadcast::channel(1);

        MetricsTickTask::new(monitor, rx).run().await;
    }
}
