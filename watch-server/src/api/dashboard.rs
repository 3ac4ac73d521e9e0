//! GET /dashboard and /store/{id} — fleet overview from the registry
//!
//! Served straight from in-memory state; no database round-trip.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::registry::StoreLivenessRecord;
use crate::state::AppState;
use shared::alert::StoreStatus;
use shared::error::AppError;
use shared::heartbeat::Heartbeat;
use shared::util::now_millis;

#[derive(Debug, Serialize)]
pub struct StoreView {
    pub store_id: String,
    pub store_name: String,
    pub status: StoreStatus,
    pub is_online: bool,
    pub last_heartbeat: Option<i64>,
    pub first_seen: i64,
    /// Most recent full heartbeat; absent on a cold-loaded record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_metrics: Option<Heartbeat>,
}

impl From<StoreLivenessRecord> for StoreView {
    fn from(record: StoreLivenessRecord) -> Self {
        Self {
            store_id: record.store_id,
            store_name: record.store_name,
            status: record.status,
            is_online: record.status == StoreStatus::Online,
            last_heartbeat: record.last_heartbeat,
            first_seen: record.first_seen,
            latest_metrics: record.latest,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
    pub last_updated: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stores: Vec<StoreView>,
    pub summary: DashboardSummary,
}

pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    let mut records = state.registry.snapshot();
    records.sort_by(|a, b| a.store_id.cmp(&b.store_id));

    let mut summary = DashboardSummary {
        total: records.len(),
        online: 0,
        offline: 0,
        unknown: 0,
        last_updated: now_millis(),
    };
    for record in &records {
        match record.status {
            StoreStatus::Online => summary.online += 1,
            StoreStatus::Offline => summary.offline += 1,
            StoreStatus::Unknown => summary.unknown += 1,
        }
    }

    Json(DashboardResponse {
        stores: records.into_iter().map(StoreView::from).collect(),
        summary,
    })
}

pub async fn store_detail(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<StoreView>, AppError> {
    state
        .registry
        .get(&store_id)
        .map(|record| Json(StoreView::from(record)))
        .ok_or_else(|| AppError::store_not_found(store_id))
}
