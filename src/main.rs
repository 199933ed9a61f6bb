use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;

use marketplace_realtime::config::Settings;
use marketplace_realtime::metrics::encode_metrics;
use marketplace_realtime::telemetry::init_telemetry;
use marketplace_realtime::transport::create_transport;
use marketplace_realtime::RealtimeService;

/// Interval of the periodic health log
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;

    // Initialize tracing (and OpenTelemetry when enabled)
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(url = %settings.connection.url, "Configuration loaded");

    let transport = create_transport(&settings.transport);
    let service = RealtimeService::new(settings, transport);
    service.initialize();

    let user_id = std::env::var("REALTIME_USER_ID").context("REALTIME_USER_ID is not set")?;
    let token = std::env::var("REALTIME_TOKEN").context("REALTIME_TOKEN is not set")?;

    // A failed handshake is not fatal: the manager keeps retrying with backoff
    if let Err(e) = service.connect(&user_id, &token).await {
        tracing::warn!(error = %e, code = e.code(), "Initial connect failed");
    }

    let mut health_timer = tokio::time::interval(HEALTH_LOG_INTERVAL);
    health_timer.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = health_timer.tick() => {
                let health = service.get_health_status();
                let metrics = service.monitor().get_metrics();
                tracing::info!(
                    healthy = health.healthy,
                    error = health.error.as_deref().unwrap_or(""),
                    messages_sent = metrics.messages_sent,
                    messages_received = metrics.messages_received,
                    error_rate_percent = metrics.error_rate_percent,
                    queue_size = service.queue().len(),
                    "Health check"
                );
            }
        }
    }

    service.destroy().await;

    match encode_metrics() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }

    tracing::info!("Probe shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        }
    }
}
