//! Operator endpoints: health, synchronous sweep, test alerts, recipient
//! config management

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::dispatcher::AlertPlan;
use crate::state::AppState;
use crate::sweeper::{self, SweepReport};
use shared::alert::{AlertKind, AlertSeverity};
use shared::error::AppError;
use shared::util::now_millis;

/// GET /health — process liveness + counters
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "watch-server",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "uptime_seconds": state.counters.uptime_seconds(),
        "stores_tracked": state.registry.len(),
        "heartbeats_received": state.counters.heartbeats_received(),
        "buffered_replays": state.counters.buffered_replays(),
        "alerts_dispatched": state.dispatcher.dispatched_count(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub hydrated: usize,
    #[serde(flatten)]
    pub sweep: SweepReport,
}

/// GET /trigger-health-check — hydrate from persistence and run one sweep
/// synchronously.
pub async fn trigger_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthCheckResponse>, AppError> {
    let hydrated = sweeper::hydrate_registry(&state).await.map_err(|e| {
        tracing::error!("Hydration failed during manual health check: {e}");
        AppError::database("Failed to hydrate stores from persistence")
    })?;

    let sweep = sweeper::run_sweep(&state, now_millis()).await;
    Ok(Json(HealthCheckResponse { hydrated, sweep }))
}

#[derive(Debug, Serialize)]
pub struct TestEmailResponse {
    pub store_id: String,
    pub emitted: bool,
    pub recipients: usize,
}

/// GET /test-email/{id} — push a test alert through the full dispatch path
/// (alert row + notification) for one store.
pub async fn test_email(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<TestEmailResponse>, AppError> {
    let store_name = state
        .registry
        .get(&store_id)
        .map(|record| record.store_name)
        .unwrap_or_default();

    let recipients = state.recipients.lookup(&store_id).len();
    let now = now_millis();
    let emitted = state
        .dispatcher
        .dispatch(
            AlertPlan {
                store_id: store_id.clone(),
                store_name,
                kind: AlertKind::Test,
                severity: AlertSeverity::Low,
                message: format!("Test alert for store {store_id} requested by operator"),
                telemetry_summary: None,
                last_seen: None,
                bypass_cooldown: false,
            },
            now,
        )
        .await;

    Ok(Json(TestEmailResponse {
        store_id,
        emitted,
        recipients,
    }))
}

/// GET /config/email — current recipient map
pub async fn email_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "recipients": state.recipients.snapshot(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub entries: usize,
}

/// POST /config/reload — re-read the recipients file from disk
pub async fn reload_config(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let entries = state.recipients.reload()?;
    Ok(Json(ReloadResponse { entries }))
}
