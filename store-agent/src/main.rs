//! store-agent — per-store monitoring client
//!
//! Samples host telemetry, camera health and application counters into
//! periodic heartbeats shipped to the central watch-server. Heartbeats that
//! cannot be delivered are buffered in local SQLite and replayed in order
//! once the server is reachable again.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use store_agent::{
    AgentConfig, AppStatus, HeartbeatBuffer, HeartbeatShipper, SpeedCache, TelemetryCollector,
};

#[tokio::main]
async fn main() {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "store_agent=info".into()),
        )
        .with_target(false)
        .init();

    let config = Arc::new(AgentConfig::from_env());
    tracing::info!(
        store_id = %config.store_id,
        store_name = %config.store_name,
        server = %config.server_url,
        "Starting store-agent"
    );

    let app = AppStatus::new(config.app_version.clone());
    let speed_cache = Arc::new(SpeedCache::new());
    let buffer = Arc::new(HeartbeatBuffer::open(&config.buffer_db_path).await);
    let collector = TelemetryCollector::new(config.clone(), app.clone(), speed_cache.clone());

    let shipper = HeartbeatShipper::new(config, collector, buffer, app, speed_cache);

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(shipper.run(shutdown.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = worker.await {
        tracing::error!("Shipper task ended abnormally: {e}");
    }
}
