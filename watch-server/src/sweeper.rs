//! Health sweeper — periodic scan that infers offline stores from silence
//!
//! The sweeper only ever pushes stores toward `offline`; recovery requires
//! direct evidence (a heartbeat) and is handled by the registry on the
//! ingestion path. Each pass is idempotent, so a missed or late tick is
//! harmless.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::db::stores;
use crate::registry::TransitionEvent;
use crate::state::AppState;
use shared::alert::StoreStatus;
use shared::util::now_millis;

/// Grace buffer on top of the alert threshold, preventing the race where the
/// sweeper runs between a heartbeat being due and arriving.
pub const OFFLINE_GRACE_MS: i64 = 30_000;

/// Outcome of one sweep pass, reported by the admin trigger endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SweepReport {
    pub stores_checked: usize,
    pub went_offline: usize,
    pub repeat_offline: usize,
    pub alerts_emitted: usize,
}

/// Run one sweep: collect offline events from the registry, mirror status
/// transitions to persistence, and hand every event to the dispatcher.
pub async fn run_sweep(state: &AppState, now: i64) -> SweepReport {
    let stores_checked = state.registry.len();
    let events = state.registry.sweep(now, state.config.offline_after_ms());

    let mut report = SweepReport {
        stores_checked,
        went_offline: 0,
        repeat_offline: 0,
        alerts_emitted: 0,
    };

    for event in &events {
        if let TransitionEvent::Offline { repeat, .. } = event {
            if *repeat {
                report.repeat_offline += 1;
            } else {
                report.went_offline += 1;
                // Mirror the transition; in-memory state stays authoritative.
                if let Err(e) =
                    stores::update_status(&state.pool, event.store_id(), StoreStatus::Offline, now)
                        .await
                {
                    tracing::warn!(
                        store_id = %event.store_id(),
                        "Failed to persist offline status: {e}"
                    );
                }
            }
        }

        if state.dispatcher.dispatch_event(event, now).await {
            report.alerts_emitted += 1;
        }
    }

    if report.went_offline > 0 || report.alerts_emitted > 0 {
        tracing::info!(
            checked = report.stores_checked,
            went_offline = report.went_offline,
            repeats = report.repeat_offline,
            alerts = report.alerts_emitted,
            "Sweep pass complete"
        );
    } else {
        tracing::debug!(checked = report.stores_checked, "Sweep pass: all quiet");
    }

    report
}

/// Seed the registry with stores known only to persistence. Runs at boot and
/// on the admin trigger endpoint; hydrated records come back `unknown` and
/// produce no alert until the next heartbeat or sweep judges them.
pub async fn hydrate_registry(state: &AppState) -> Result<usize, crate::db::BoxError> {
    let rows = stores::load_all(&state.pool).await?;
    let inserted = state.registry.hydrate(rows);
    if inserted > 0 {
        tracing::info!(count = inserted, "Hydrated stores from persistence");
    }
    Ok(inserted)
}

/// Sweeper worker loop. The first tick fires immediately, which is wanted:
/// a restarted server should judge hydrated stores without waiting a full
/// interval.
pub async fn run_worker(state: AppState, shutdown: CancellationToken) {
    let period = Duration::from_secs(state.config.health_check_interval_minutes * 60);
    let mut interval = tokio::time::interval(period);
    tracing::info!(period_secs = period.as_secs(), "Health sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                run_sweep(&state, now_millis()).await;
            }
        }
    }

    tracing::info!("Health sweeper stopped");
}
