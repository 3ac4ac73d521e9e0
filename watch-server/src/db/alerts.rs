//! `alerts` table — append-only alert log

use sqlx::PgPool;

use super::BoxError;
use shared::alert::{AlertKind, AlertRecord, AlertSeverity};
use shared::util::snowflake_id;

/// Data for a new alert row; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub store_id: String,
    pub kind: AlertKind,
    pub message: String,
    pub severity: AlertSeverity,
}

/// Insert an alert row and return its id.
pub async fn insert(pool: &PgPool, alert: &NewAlert, now: i64) -> Result<i64, BoxError> {
    let id = snowflake_id();
    sqlx::query(
        r#"
        INSERT INTO alerts (id, store_id, alert_type, message, severity, resolved, timestamp)
        VALUES ($1, $2, $3, $4, $5, FALSE, $6)
        "#,
    )
    .bind(id)
    .bind(&alert.store_id)
    .bind(alert.kind.as_str())
    .bind(&alert.message)
    .bind(alert.severity.as_str())
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: i64,
    store_id: String,
    store_name: Option<String>,
    alert_type: String,
    message: String,
    severity: String,
    resolved: bool,
    resolved_at: Option<i64>,
    timestamp: i64,
}

impl From<AlertRow> for AlertRecord {
    fn from(row: AlertRow) -> Self {
        AlertRecord {
            id: row.id,
            store_id: row.store_id,
            store_name: row.store_name.unwrap_or_default(),
            alert_type: AlertKind::parse(&row.alert_type).unwrap_or(AlertKind::Test),
            message: row.message,
            severity: AlertSeverity::parse(&row.severity),
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            timestamp: row.timestamp,
        }
    }
}

/// Most recent alerts across the fleet, joined with store names.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<AlertRecord>, BoxError> {
    let rows: Vec<AlertRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.store_id, s.store_name, a.alert_type, a.message,
               a.severity, a.resolved, a.resolved_at, a.timestamp
        FROM alerts a
        LEFT JOIN stores s ON s.store_id = a.store_id
        ORDER BY a.timestamp DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AlertRecord::from).collect())
}

/// Most recent alerts for one store.
pub async fn recent_for_store(
    pool: &PgPool,
    store_id: &str,
    limit: i64,
) -> Result<Vec<AlertRecord>, BoxError> {
    let rows: Vec<AlertRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.store_id, s.store_name, a.alert_type, a.message,
               a.severity, a.resolved, a.resolved_at, a.timestamp
        FROM alerts a
        LEFT JOIN stores s ON s.store_id = a.store_id
        WHERE a.store_id = $1
        ORDER BY a.timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(store_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AlertRecord::from).collect())
}
