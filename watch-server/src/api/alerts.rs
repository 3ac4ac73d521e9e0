//! GET /alerts and /alerts/{id} — the alert log

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::alerts;
use crate::error::ServiceError;
use crate::state::AppState;
use shared::alert::AlertRecord;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<i64>,
}

impl AlertsQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Most recent alerts across the fleet.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<AlertRecord>>, ServiceError> {
    let rows = alerts::recent(&state.pool, query.limit()).await?;
    Ok(Json(rows))
}

/// Alerts for one store.
pub async fn for_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<AlertRecord>>, ServiceError> {
    let rows = alerts::recent_for_store(&state.pool, &store_id, query.limit()).await?;
    Ok(Json(rows))
}
