//! watch-server — central store fleet monitoring service
//!
//! Long-running service that:
//! - Ingests heartbeats from store agents (live + buffered replay)
//! - Tracks per-store liveness in memory, mirrored to Postgres
//! - Sweeps for silent stores and classifies transitions
//! - Dispatches alert emails to per-store recipients

mod api;
mod config;
mod db;
mod dispatcher;
mod email;
mod error;
mod recipients;
mod registry;
mod state;
mod sweeper;
mod tasks;

use std::sync::Arc;

use tokio::sync::mpsc;

use config::Config;
use dispatcher::AlertDispatcher;
use recipients::RecipientsConfig;
use registry::LivenessRegistry;
use state::{AppState, Counters};
use tasks::{BackgroundTasks, TaskKind};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Mail queue depth; beyond this the dispatcher drops notifications rather
/// than stall ingestion.
const MAIL_QUEUE_DEPTH: usize = 256;

/// Boot-time database connect attempts before giving up.
const DB_CONNECT_ATTEMPTS: u32 = 8;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    init_tracing(&config);

    tracing::info!(
        env = %config.environment,
        threshold_min = config.alert_threshold_minutes,
        sweep_min = config.health_check_interval_minutes,
        "Starting watch-server"
    );

    let pool = db::connect(&config.database_url, DB_CONNECT_ATTEMPTS).await?;

    let recipients = Arc::new(RecipientsConfig::load(config.email_config_path.clone()));
    let (mail_tx, mail_rx) = mpsc::channel(MAIL_QUEUE_DEPTH);
    let mailer = email::EmailConfig::from_env().map(email::Mailer::new);
    if mailer.is_none() {
        tracing::warn!("SMTP_HOST not set, alert emails will be logged and dropped");
    }

    let dispatcher = Arc::new(AlertDispatcher::new(
        pool.clone(),
        config.cooldown_policy(),
        recipients.clone(),
        mail_tx,
    ));

    let state = AppState {
        pool,
        config: Arc::new(config),
        registry: Arc::new(LivenessRegistry::new()),
        dispatcher,
        recipients,
        counters: Arc::new(Counters::new()),
    };

    // Explicit hydration step: known stores come back as `unknown` so the
    // sweeper and later heartbeats can judge them.
    if let Err(e) = sweeper::hydrate_registry(&state).await {
        tracing::error!("Boot hydration failed, starting with an empty registry: {e}");
    }

    let mut tasks = BackgroundTasks::new();
    tasks.spawn(
        "mailer",
        TaskKind::Worker,
        email::run_mailer(mail_rx, mailer, tasks.shutdown_token()),
    );
    tasks.spawn(
        "health_sweeper",
        TaskKind::Periodic,
        sweeper::run_worker(state.clone(), tasks.shutdown_token()),
    );

    let addr = format!("0.0.0.0:{}", state.config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("watch-server listening on {addr}");

    let pool = state.pool.clone();
    let router = api::create_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown().await;
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Structured logging to stdout, plus a daily-rolling file when LOG_DIR is
/// set and exists.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "watch_server=info,tower_http=info".into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if let Some(dir) = &config.log_dir
        && std::path::Path::new(dir).exists()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "watch-server");
        subscriber.with_writer(file_appender).with_ansi(false).init();
        return;
    }

    subscriber.init();
}
