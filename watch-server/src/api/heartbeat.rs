//! POST /heartbeat and /heartbeat/buffered — heartbeat ingestion
//!
//! Both paths validate, feed the liveness registry, dispatch any transition
//! alert, and archive the heartbeat in one transaction. A persistence
//! failure is logged but does not fail the ack: a delivered heartbeat must
//! not be re-buffered by the client.

use axum::extract::State;
use axum::Json;
use sqlx::PgPool;

use crate::db::{history, stores, BoxError};
use crate::state::AppState;
use shared::error::AppError;
use shared::heartbeat::{Heartbeat, HeartbeatAck};
use shared::util::now_millis;

/// Live ingestion — the normal path.
pub async fn handle_live(
    State(state): State<AppState>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<HeartbeatAck>, AppError> {
    ingest(state, heartbeat, false).await
}

/// Replay ingestion — buffered heartbeats drained after an outage.
/// Semantically identical to the live path; at-least-once duplicates are
/// accepted and archived again.
pub async fn handle_buffered(
    State(state): State<AppState>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<HeartbeatAck>, AppError> {
    ingest(state, heartbeat, true).await
}

async fn ingest(
    state: AppState,
    heartbeat: Heartbeat,
    replay: bool,
) -> Result<Json<HeartbeatAck>, AppError> {
    heartbeat.validate()?;

    let received_at = now_millis();
    state.counters.record_heartbeat(replay);

    tracing::debug!(
        store_id = %heartbeat.store_id,
        is_startup = heartbeat.is_startup,
        replay,
        "Heartbeat received"
    );

    // Registry first: liveness must move even if persistence is down.
    if let Some(event) = state.registry.apply_heartbeat(&heartbeat, received_at) {
        state.dispatcher.dispatch_event(&event, received_at).await;
    }

    if let Err(e) = persist(&state.pool, &heartbeat, received_at).await {
        tracing::error!(
            store_id = %heartbeat.store_id,
            "Failed to persist heartbeat, acking anyway: {e}"
        );
    }

    Ok(Json(HeartbeatAck {
        status: "ok".to_string(),
        total_stores_monitored: state.registry.len(),
    }))
}

/// Store upsert + history insert + system-stats insert, one transaction per
/// heartbeat.
async fn persist(pool: &PgPool, heartbeat: &Heartbeat, received_at: i64) -> Result<(), BoxError> {
    let mut tx = pool.begin().await?;
    stores::upsert_on_heartbeat(&mut tx, &heartbeat.store_id, &heartbeat.store_name, received_at)
        .await?;
    history::insert_history(&mut tx, heartbeat, received_at).await?;
    history::insert_system_stats(&mut tx, heartbeat, received_at).await?;
    tx.commit().await?;
    Ok(())
}
