//! Liveness registry — per-store in-memory state and transition detection
//!
//! The registry is the single writer of store liveness state. It mutates
//! state and returns typed [`TransitionEvent`] values; all alerting policy
//! (cooldowns, persistence, notification) lives in the dispatcher. Keeping
//! the registry pure isolates concurrency control to one lock.
//!
//! Recovery is only ever produced by an incoming heartbeat; offline is only
//! ever inferred by [`LivenessRegistry::sweep`]. This asymmetry eliminates
//! the race where a just-arrived heartbeat was followed by a spurious
//! offline/recovery pair.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared::alert::StoreStatus;
use shared::heartbeat::Heartbeat;

/// In-memory liveness record for one store. Mirrored to the `stores` row;
/// never destroyed — offline stores remain known.
#[derive(Debug, Clone)]
pub struct StoreLivenessRecord {
    pub store_id: String,
    pub store_name: String,
    pub status: StoreStatus,
    /// Server receipt instant of the newest heartbeat (UTC millis). Absent
    /// on a cold-loaded row that never heartbeated.
    pub last_heartbeat: Option<i64>,
    /// Stable across the lifetime of the record.
    pub first_seen: i64,
    /// Snapshot of the most recent heartbeat; absent on a cold-loaded row.
    pub latest: Option<Heartbeat>,
}

/// A state transition detected by the registry, to be classified and
/// delivered by the alert dispatcher.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// A client process began emitting heartbeats: fresh store, a store in
    /// `unknown` state, or an `is_startup` heartbeat on an online store
    /// (client-side restart — never classified as recovery).
    Startup {
        store_id: String,
        store_name: String,
        heartbeat: Box<Heartbeat>,
    },
    /// A previously offline store resumed heartbeating.
    Recovery {
        store_id: String,
        store_name: String,
        heartbeat: Box<Heartbeat>,
        /// How long the store had been silent, when known.
        silent_for_ms: Option<i64>,
    },
    /// The sweeper judged a store silent past the threshold. `repeat` is
    /// false exactly on the online→offline transition.
    Offline {
        store_id: String,
        store_name: String,
        last_heartbeat: i64,
        silent_for_ms: i64,
        repeat: bool,
    },
}

impl TransitionEvent {
    pub fn store_id(&self) -> &str {
        match self {
            Self::Startup { store_id, .. }
            | Self::Recovery { store_id, .. }
            | Self::Offline { store_id, .. } => store_id,
        }
    }
}

/// Seed data for [`LivenessRegistry::hydrate`], read from the `stores` table.
#[derive(Debug, Clone)]
pub struct HydrationRow {
    pub store_id: String,
    pub store_name: String,
    pub last_heartbeat: Option<i64>,
    pub first_seen: i64,
}

/// Keyed map from store id to liveness record. Writers are serialized by the
/// lock; critical sections are short and never perform I/O.
pub struct LivenessRegistry {
    stores: RwLock<HashMap<String, StoreLivenessRecord>>,
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a received heartbeat and return the transition it caused, if
    /// any. `received_at` is the server receipt instant — receipt itself is
    /// proof of life, so the store always ends up `online` regardless of the
    /// client timestamp, and `last_heartbeat` never rewinds.
    pub fn apply_heartbeat(
        &self,
        heartbeat: &Heartbeat,
        received_at: i64,
    ) -> Option<TransitionEvent> {
        let mut stores = self.stores.write();

        let Some(record) = stores.get_mut(&heartbeat.store_id) else {
            stores.insert(
                heartbeat.store_id.clone(),
                StoreLivenessRecord {
                    store_id: heartbeat.store_id.clone(),
                    store_name: heartbeat.store_name.clone(),
                    status: StoreStatus::Online,
                    last_heartbeat: Some(received_at),
                    first_seen: received_at,
                    latest: Some(heartbeat.clone()),
                },
            );
            return Some(TransitionEvent::Startup {
                store_id: heartbeat.store_id.clone(),
                store_name: heartbeat.store_name.clone(),
                heartbeat: Box::new(heartbeat.clone()),
            });
        };

        let previous_status = record.status;
        let previous_seen = record.last_heartbeat;

        record.status = StoreStatus::Online;
        record.last_heartbeat = Some(previous_seen.map_or(received_at, |p| p.max(received_at)));
        record.store_name = heartbeat.store_name.clone();
        record.latest = Some(heartbeat.clone());

        match previous_status {
            StoreStatus::Unknown => Some(TransitionEvent::Startup {
                store_id: heartbeat.store_id.clone(),
                store_name: heartbeat.store_name.clone(),
                heartbeat: Box::new(heartbeat.clone()),
            }),
            StoreStatus::Offline => Some(TransitionEvent::Recovery {
                store_id: heartbeat.store_id.clone(),
                store_name: heartbeat.store_name.clone(),
                heartbeat: Box::new(heartbeat.clone()),
                silent_for_ms: previous_seen.map(|p| received_at - p),
            }),
            // An is_startup flag on an already-online store is a client-side
            // restart, not an outage.
            StoreStatus::Online => heartbeat.is_startup.then(|| TransitionEvent::Startup {
                store_id: heartbeat.store_id.clone(),
                store_name: heartbeat.store_name.clone(),
                heartbeat: Box::new(heartbeat.clone()),
            }),
        }
    }

    /// Scan all records and mark those silent for strictly longer than
    /// `threshold_ms` as offline. Returns the offline events found this
    /// pass; repeat events are cooldown-gated downstream. Records that have
    /// never heartbeated are skipped. Never produces online transitions.
    pub fn sweep(&self, now: i64, threshold_ms: i64) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        let mut stores = self.stores.write();

        for record in stores.values_mut() {
            let Some(last) = record.last_heartbeat else {
                continue;
            };
            let silent_for = now - last;
            if silent_for <= threshold_ms {
                continue;
            }
            let repeat = record.status == StoreStatus::Offline;
            record.status = StoreStatus::Offline;
            events.push(TransitionEvent::Offline {
                store_id: record.store_id.clone(),
                store_name: record.store_name.clone(),
                last_heartbeat: last,
                silent_for_ms: silent_for,
                repeat,
            });
        }

        events
    }

    /// Seed records from persistence with `unknown` status. Stores already
    /// in memory are left untouched; hydration never downgrades live state.
    /// Returns the number of records inserted.
    pub fn hydrate(&self, rows: Vec<HydrationRow>) -> usize {
        let mut stores = self.stores.write();
        let mut inserted = 0;

        for row in rows {
            if stores.contains_key(&row.store_id) {
                continue;
            }
            stores.insert(
                row.store_id.clone(),
                StoreLivenessRecord {
                    store_id: row.store_id,
                    store_name: row.store_name,
                    status: StoreStatus::Unknown,
                    last_heartbeat: row.last_heartbeat,
                    first_seen: row.first_seen,
                    latest: None,
                },
            );
            inserted += 1;
        }

        inserted
    }

    pub fn get(&self, store_id: &str) -> Option<StoreLivenessRecord> {
        self.stores.read().get(store_id).cloned()
    }

    /// Clone of all records, for the dashboard and the sweeper report.
    pub fn snapshot(&self) -> Vec<StoreLivenessRecord> {
        self.stores.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }
}

impl Default for LivenessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::heartbeat::{
        ApplicationStats, CameraStatus, LocationInfo, NetworkInfo, SystemStats,
    };

    const MIN: i64 = 60_000;
    /// 5 minute threshold + 30s grace, as configured by default.
    const THRESHOLD: i64 = 5 * MIN + 30_000;

    fn heartbeat(store_id: &str, ts: i64, is_startup: bool) -> Heartbeat {
        Heartbeat {
            store_id: store_id.into(),
            store_name: format!("Store {store_id}"),
            timestamp: ts,
            is_startup,
            system_stats: SystemStats::default(),
            camera_status: CameraStatus::default(),
            application_stats: ApplicationStats::default(),
            location_info: LocationInfo::default(),
            network_info: NetworkInfo::default(),
        }
    }

    /// 12:00:00 on an arbitrary day, in millis.
    const T0: i64 = 1_750_000_000_000;

    #[test]
    fn first_heartbeat_creates_online_record_with_startup_event() {
        let registry = LivenessRegistry::new();
        let event = registry.apply_heartbeat(&heartbeat("a", T0, true), T0);

        assert!(matches!(event, Some(TransitionEvent::Startup { .. })));
        let record = registry.get("a").unwrap();
        assert_eq!(record.status, StoreStatus::Online);
        assert_eq!(record.last_heartbeat, Some(T0));
        assert_eq!(record.first_seen, T0);
    }

    #[test]
    fn steady_state_heartbeats_produce_no_events() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, true), T0);

        for i in 1..=3 {
            let now = T0 + i * MIN;
            let event = registry.apply_heartbeat(&heartbeat("a", now, false), now);
            assert!(event.is_none(), "tick {i} should be silent");
        }
        assert_eq!(registry.get("a").unwrap().last_heartbeat, Some(T0 + 3 * MIN));
    }

    #[test]
    fn silent_outage_timeline() {
        // Scenario: last heartbeat at 12:03, sweeps at 12:06 / 12:08 / 12:10.
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, true), T0);
        let last = T0 + 3 * MIN;
        registry.apply_heartbeat(&heartbeat("a", last, false), last);

        // 12:06 — silent 3m < 5.5m
        assert!(registry.sweep(T0 + 6 * MIN, THRESHOLD).is_empty());
        // 12:08 — silent 5m < 5.5m
        assert!(registry.sweep(T0 + 8 * MIN, THRESHOLD).is_empty());

        // 12:10 — silent 7m > 5.5m: first offline transition
        let events = registry.sweep(T0 + 10 * MIN, THRESHOLD);
        assert_eq!(events.len(), 1);
        match &events[0] {
            TransitionEvent::Offline {
                repeat,
                silent_for_ms,
                last_heartbeat,
                ..
            } => {
                assert!(!repeat);
                assert_eq!(*silent_for_ms, 7 * MIN);
                assert_eq!(*last_heartbeat, last);
            }
            other => panic!("expected offline event, got {other:?}"),
        }
        assert_eq!(registry.get("a").unwrap().status, StoreStatus::Offline);

        // Subsequent sweeps report repeats (cooldown gating is downstream).
        let events = registry.sweep(T0 + 12 * MIN, THRESHOLD);
        assert!(matches!(
            events[0],
            TransitionEvent::Offline { repeat: true, .. }
        ));
    }

    #[test]
    fn boundary_exactly_threshold_does_not_fire() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, false), T0);

        assert!(registry.sweep(T0 + THRESHOLD, THRESHOLD).is_empty());
        assert_eq!(registry.sweep(T0 + THRESHOLD + 1, THRESHOLD).len(), 1);
    }

    #[test]
    fn recovery_comes_from_heartbeat_not_sweeper() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, false), T0);
        registry.sweep(T0 + 10 * MIN, THRESHOLD);
        assert_eq!(registry.get("a").unwrap().status, StoreStatus::Offline);

        let now = T0 + 17 * MIN;
        let event = registry.apply_heartbeat(&heartbeat("a", now, false), now);
        match event {
            Some(TransitionEvent::Recovery { silent_for_ms, .. }) => {
                assert_eq!(silent_for_ms, Some(17 * MIN));
            }
            other => panic!("expected recovery, got {other:?}"),
        }
        assert_eq!(registry.get("a").unwrap().status, StoreStatus::Online);
    }

    #[test]
    fn startup_flag_on_online_store_is_restart_not_recovery() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, true), T0);

        let now = T0 + MIN;
        let event = registry.apply_heartbeat(&heartbeat("a", now, true), now);
        assert!(matches!(event, Some(TransitionEvent::Startup { .. })));
    }

    #[test]
    fn hydrated_store_comes_back_unknown_then_startup() {
        // Scenario: server restart at 13:00, store B hydrated from
        // persistence, heartbeat at 13:00:30 → startup, never recovery.
        let registry = LivenessRegistry::new();
        let restart = T0 + 60 * MIN;
        let inserted = registry.hydrate(vec![HydrationRow {
            store_id: "b".into(),
            store_name: "Store b".into(),
            last_heartbeat: Some(T0),
            first_seen: T0 - 86_400_000,
        }]);
        assert_eq!(inserted, 1);
        assert_eq!(registry.get("b").unwrap().status, StoreStatus::Unknown);

        let now = restart + 30_000;
        let event = registry.apply_heartbeat(&heartbeat("b", now, false), now);
        assert!(matches!(event, Some(TransitionEvent::Startup { .. })));
    }

    #[test]
    fn hydrate_never_touches_live_records() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, false), T0);

        let inserted = registry.hydrate(vec![HydrationRow {
            store_id: "a".into(),
            store_name: "stale name".into(),
            last_heartbeat: None,
            first_seen: 0,
        }]);
        assert_eq!(inserted, 0);
        let record = registry.get("a").unwrap();
        assert_eq!(record.status, StoreStatus::Online);
        assert_eq!(record.first_seen, T0);
    }

    #[test]
    fn hydrated_record_without_heartbeat_is_skipped_by_sweep() {
        let registry = LivenessRegistry::new();
        registry.hydrate(vec![HydrationRow {
            store_id: "cold".into(),
            store_name: "Cold".into(),
            last_heartbeat: None,
            first_seen: T0,
        }]);
        assert!(registry.sweep(T0 + 60 * MIN, THRESHOLD).is_empty());
        assert_eq!(registry.get("cold").unwrap().status, StoreStatus::Unknown);
    }

    #[test]
    fn stale_client_timestamp_never_rewinds_last_heartbeat() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, false), T0);
        registry.sweep(T0 + 10 * MIN, THRESHOLD);

        // Buffered replay delivered late: receipt instant is what counts,
        // and an older receipt must not rewind.
        let event = registry.apply_heartbeat(&heartbeat("a", T0 - 5 * MIN, false), T0 - 5 * MIN);
        assert!(matches!(event, Some(TransitionEvent::Recovery { .. })));
        let record = registry.get("a").unwrap();
        assert_eq!(record.status, StoreStatus::Online);
        assert_eq!(record.last_heartbeat, Some(T0));
    }

    #[test]
    fn first_seen_is_stable_across_transitions() {
        let registry = LivenessRegistry::new();
        registry.apply_heartbeat(&heartbeat("a", T0, true), T0);
        registry.sweep(T0 + 10 * MIN, THRESHOLD);
        registry.apply_heartbeat(&heartbeat("a", T0 + 20 * MIN, false), T0 + 20 * MIN);
        assert_eq!(registry.get("a").unwrap().first_seen, T0);
    }
}
