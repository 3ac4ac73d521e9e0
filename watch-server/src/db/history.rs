//! Append-only heartbeat archives
//!
//! Every accepted heartbeat yields exactly one `heartbeat_history` row and
//! one `system_stats` row, written in the same transaction as the store
//! upsert. The raw payload is kept as JSONB so a heartbeat can be reloaded
//! semantically intact.

use sqlx::{Postgres, Transaction};

use super::BoxError;
use shared::heartbeat::Heartbeat;

pub async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    heartbeat: &Heartbeat,
    received_at: i64,
) -> Result<(), BoxError> {
    let payload = serde_json::to_value(heartbeat)?;
    sqlx::query(
        r#"
        INSERT INTO heartbeat_history
            (store_id, timestamp, cpu_usage, memory_usage, disk_free_gb,
             active_cameras, total_cameras, network_connected, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&heartbeat.store_id)
    .bind(heartbeat.timestamp)
    .bind(heartbeat.system_stats.cpu_percent)
    .bind(heartbeat.system_stats.memory_percent)
    .bind(heartbeat.system_stats.disk_free_gb)
    .bind(heartbeat.camera_status.active_cameras as i32)
    .bind(heartbeat.camera_status.total_cameras as i32)
    .bind(heartbeat.system_stats.network_connected)
    .bind(payload)
    .bind(received_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn insert_system_stats(
    tx: &mut Transaction<'_, Postgres>,
    heartbeat: &Heartbeat,
    received_at: i64,
) -> Result<(), BoxError> {
    let stats = &heartbeat.system_stats;
    sqlx::query(
        r#"
        INSERT INTO system_stats
            (store_id, timestamp, cpu_usage, memory_usage, memory_available_gb,
             disk_free_gb, disk_usage_percent, process_memory_mb, uptime_hours,
             network_connected, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&heartbeat.store_id)
    .bind(heartbeat.timestamp)
    .bind(stats.cpu_percent)
    .bind(stats.memory_percent)
    .bind(stats.memory_available_gb)
    .bind(stats.disk_free_gb)
    .bind(stats.disk_usage_percent)
    .bind(stats.process_memory_mb)
    .bind(stats.uptime_hours)
    .bind(stats.network_connected)
    .bind(received_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
