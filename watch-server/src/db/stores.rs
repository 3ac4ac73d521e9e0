//! `stores` table operations — upserted on each heartbeat, scanned at boot
//! to hydrate the liveness registry.

use sqlx::{PgPool, Postgres, Transaction};

use super::BoxError;
use crate::registry::HydrationRow;
use shared::alert::StoreStatus;

/// The columns hydration cares about; persisted status is ignored on load —
/// a restarted server re-learns liveness from scratch.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoreRow {
    store_id: String,
    store_name: String,
    last_heartbeat: Option<i64>,
    first_seen: i64,
}

// ── Heartbeat path ──

/// Upsert the store row for an accepted heartbeat. `first_seen` and
/// `created_at` are only written on insert; `last_heartbeat` never rewinds.
pub async fn upsert_on_heartbeat(
    tx: &mut Transaction<'_, Postgres>,
    store_id: &str,
    store_name: &str,
    received_at: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO stores (store_id, store_name, last_heartbeat, status, first_seen, created_at, updated_at)
        VALUES ($1, $2, $3, 'online', $3, $3, $3)
        ON CONFLICT (store_id) DO UPDATE SET
            store_name = EXCLUDED.store_name,
            last_heartbeat = GREATEST(COALESCE(stores.last_heartbeat, 0), EXCLUDED.last_heartbeat),
            status = 'online',
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(store_id)
    .bind(store_name)
    .bind(received_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ── Sweeper path ──

/// Mirror a status transition decided by the registry. Best-effort: the
/// in-memory state is authoritative.
pub async fn update_status(
    pool: &PgPool,
    store_id: &str,
    status: StoreStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE stores SET status = $2, updated_at = $3 WHERE store_id = $1")
        .bind(store_id)
        .bind(status.as_str())
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stamp the last alert sent for a store.
pub async fn update_last_alert(pool: &PgPool, store_id: &str, now: i64) -> Result<(), BoxError> {
    sqlx::query("UPDATE stores SET last_alert_sent = $2, updated_at = $2 WHERE store_id = $1")
        .bind(store_id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

// ── Hydration ──

/// All known stores, for registry hydration at boot and on admin trigger.
pub async fn load_all(pool: &PgPool) -> Result<Vec<HydrationRow>, BoxError> {
    let rows: Vec<StoreRow> = sqlx::query_as(
        "SELECT store_id, store_name, last_heartbeat, first_seen FROM stores",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| HydrationRow {
            store_id: r.store_id,
            store_name: r.store_name,
            last_heartbeat: r.last_heartbeat,
            first_seen: r.first_seen,
        })
        .collect())
}
