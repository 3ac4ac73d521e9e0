//! Alert dispatcher — classification, spam suppression, persistence and
//! notification hand-off
//!
//! Transition events from the registry and sweeper funnel through here. The
//! dispatcher applies per-store per-kind cooldowns, writes the alert log row,
//! resolves recipients and enqueues the composed mail for the mailer worker.
//! It never blocks the ingestion or sweeper paths on SMTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::db::alerts::{self, NewAlert};
use crate::db::stores;
use crate::email::{compose_alert, OutboundEmail};
use crate::recipients::RecipientsConfig;
use crate::registry::TransitionEvent;
use shared::alert::{AlertKind, AlertSeverity};
use shared::util::format_millis;

/// Minimum interval between two alerts of the same kind for the same store.
/// The first offline transition bypasses the gate; everything else does not.
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    pub offline_ms: i64,
    pub recovery_ms: i64,
    pub startup_ms: i64,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            offline_ms: 5 * 60_000,
            recovery_ms: 5 * 60_000,
            startup_ms: 10 * 60_000,
        }
    }
}

impl CooldownPolicy {
    /// Cooldown for a kind; kinds outside the liveness set are ungated.
    fn cooldown_for(&self, kind: AlertKind) -> Option<i64> {
        match kind {
            AlertKind::Offline => Some(self.offline_ms),
            AlertKind::Recovery => Some(self.recovery_ms),
            AlertKind::Startup => Some(self.startup_ms),
            _ => None,
        }
    }
}

/// Per-store per-kind last-sent instants. Lives for the process lifetime,
/// deliberately not persisted.
pub struct CooldownTable {
    last_sent: DashMap<(String, AlertKind), i64>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self {
            last_sent: DashMap::new(),
        }
    }

    /// Compare-and-set: returns true (and stamps `now`) when no send is
    /// recorded or the cooldown has elapsed. The dashmap entry lock makes
    /// the read-decide-write atomic per key.
    pub fn try_acquire(&self, store_id: &str, kind: AlertKind, now: i64, cooldown_ms: i64) -> bool {
        let mut entry = self
            .last_sent
            .entry((store_id.to_string(), kind))
            .or_insert(i64::MIN);
        if *entry == i64::MIN || now - *entry >= cooldown_ms {
            *entry = now;
            true
        } else {
            false
        }
    }

    /// Unconditional stamp, used when a send bypasses the gate so that the
    /// following repeat is still held to the cooldown.
    pub fn stamp(&self, store_id: &str, kind: AlertKind, now: i64) {
        self.last_sent.insert((store_id.to_string(), kind), now);
    }

    #[cfg(test)]
    fn last(&self, store_id: &str, kind: AlertKind) -> Option<i64> {
        self.last_sent
            .get(&(store_id.to_string(), kind))
            .map(|v| *v)
    }
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self::new()
    }
}

/// What to emit for one transition event, before cooldown gating.
#[derive(Debug, Clone)]
pub struct AlertPlan {
    pub store_id: String,
    pub store_name: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub telemetry_summary: Option<String>,
    pub last_seen: Option<i64>,
    /// True only for the fresh online→offline transition.
    pub bypass_cooldown: bool,
}

/// Classify a registry transition into an alert plan.
pub fn classify(event: &TransitionEvent) -> AlertPlan {
    match event {
        TransitionEvent::Startup {
            store_id,
            store_name,
            heartbeat,
        } => AlertPlan {
            store_id: store_id.clone(),
            store_name: store_name.clone(),
            kind: AlertKind::Startup,
            severity: AlertSeverity::Low,
            message: format!("Store {store_name} ({store_id}) started reporting heartbeats"),
            telemetry_summary: Some(heartbeat.telemetry_summary()),
            last_seen: None,
            bypass_cooldown: false,
        },
        TransitionEvent::Recovery {
            store_id,
            store_name,
            heartbeat,
            silent_for_ms,
        } => AlertPlan {
            store_id: store_id.clone(),
            store_name: store_name.clone(),
            kind: AlertKind::Recovery,
            severity: AlertSeverity::Medium,
            message: match silent_for_ms {
                Some(ms) => format!(
                    "Store {store_name} ({store_id}) is back online after {} of silence",
                    fmt_duration(*ms)
                ),
                None => format!("Store {store_name} ({store_id}) is back online"),
            },
            telemetry_summary: Some(heartbeat.telemetry_summary()),
            last_seen: None,
            bypass_cooldown: false,
        },
        TransitionEvent::Offline {
            store_id,
            store_name,
            last_heartbeat,
            silent_for_ms,
            repeat,
        } => AlertPlan {
            store_id: store_id.clone(),
            store_name: store_name.clone(),
            kind: AlertKind::Offline,
            severity: AlertSeverity::Critical,
            message: format!(
                "Store {store_name} ({store_id}) has been silent for {} (last heartbeat {})",
                fmt_duration(*silent_for_ms),
                format_millis(*last_heartbeat)
            ),
            telemetry_summary: None,
            last_seen: Some(*last_heartbeat),
            bypass_cooldown: !repeat,
        },
    }
}

fn fmt_duration(ms: i64) -> String {
    let minutes = ms / 60_000;
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{}s", ms / 1000)
    }
}

pub struct AlertDispatcher {
    pool: PgPool,
    policy: CooldownPolicy,
    cooldowns: CooldownTable,
    recipients: Arc<RecipientsConfig>,
    mail_tx: mpsc::Sender<OutboundEmail>,
    dispatched: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(
        pool: PgPool,
        policy: CooldownPolicy,
        recipients: Arc<RecipientsConfig>,
        mail_tx: mpsc::Sender<OutboundEmail>,
    ) -> Self {
        Self {
            pool,
            policy,
            cooldowns: CooldownTable::new(),
            recipients,
            mail_tx,
            dispatched: AtomicU64::new(0),
        }
    }

    /// Alerts emitted since process start (suppressed ones excluded).
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Classify and emit a registry transition. Returns true when an alert
    /// was emitted (not suppressed by cooldown).
    pub async fn dispatch_event(&self, event: &TransitionEvent, now: i64) -> bool {
        self.dispatch(classify(event), now).await
    }

    /// Emit one alert: cooldown gate → alert row → recipients → mail queue.
    pub async fn dispatch(&self, plan: AlertPlan, now: i64) -> bool {
        match self.policy.cooldown_for(plan.kind) {
            Some(cooldown_ms) if !plan.bypass_cooldown => {
                if !self
                    .cooldowns
                    .try_acquire(&plan.store_id, plan.kind, now, cooldown_ms)
                {
                    tracing::debug!(
                        store_id = %plan.store_id,
                        kind = %plan.kind,
                        "Alert suppressed by cooldown"
                    );
                    return false;
                }
            }
            // Fresh offline transition: always sent, but stamped so the
            // first repeat is still held to the cooldown.
            Some(_) => self.cooldowns.stamp(&plan.store_id, plan.kind, now),
            None => {}
        }

        tracing::info!(
            store_id = %plan.store_id,
            kind = %plan.kind,
            severity = %plan.severity,
            "Dispatching alert: {}",
            plan.message
        );
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        // Persist the alert row; a failure is logged but must not stop the
        // notification — the alert log is a mirror, not a gate.
        let row = NewAlert {
            store_id: plan.store_id.clone(),
            kind: plan.kind,
            message: plan.message.clone(),
            severity: plan.severity,
        };
        match alerts::insert(&self.pool, &row, now).await {
            Ok(_) => {
                if let Err(e) = stores::update_last_alert(&self.pool, &plan.store_id, now).await {
                    tracing::warn!(store_id = %plan.store_id, "Failed to stamp last_alert_sent: {e}");
                }
            }
            Err(e) => {
                tracing::error!(store_id = %plan.store_id, kind = %plan.kind, "Failed to persist alert: {e}");
            }
        }

        let recipients = self.recipients.lookup(&plan.store_id);
        if recipients.is_empty() {
            tracing::warn!(
                store_id = %plan.store_id,
                kind = %plan.kind,
                "No recipients configured, notification skipped"
            );
            return true;
        }

        let mut mail = compose_alert(
            plan.kind,
            plan.severity,
            &plan.store_id,
            &plan.store_name,
            &plan.message,
            plan.telemetry_summary.as_deref(),
            plan.last_seen,
        );
        mail.recipients = recipients;

        // Bounded queue; a full queue means the mailer is badly backlogged
        // and dropping is preferable to stalling ingestion.
        if let Err(e) = self.mail_tx.try_send(mail) {
            tracing::warn!(store_id = %plan.store_id, "Mail queue rejected notification: {e}");
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransitionEvent;
    use shared::heartbeat::{
        ApplicationStats, CameraStatus, Heartbeat, LocationInfo, NetworkInfo, SystemStats,
    };

    const MIN: i64 = 60_000;
    const T0: i64 = 1_750_000_000_000;

    fn heartbeat(id: &str) -> Box<Heartbeat> {
        Box::new(Heartbeat {
            store_id: id.into(),
            store_name: format!("Store {id}"),
            timestamp: T0,
            is_startup: false,
            system_stats: SystemStats::default(),
            camera_status: CameraStatus::default(),
            application_stats: ApplicationStats::default(),
            location_info: LocationInfo::default(),
            network_info: NetworkInfo::default(),
        })
    }

    #[test]
    fn cooldown_first_acquire_always_passes() {
        let table = CooldownTable::new();
        assert!(table.try_acquire("a", AlertKind::Startup, T0, 10 * MIN));
        assert_eq!(table.last("a", AlertKind::Startup), Some(T0));
    }

    #[test]
    fn cooldown_suppresses_until_elapsed() {
        let table = CooldownTable::new();
        assert!(table.try_acquire("a", AlertKind::Offline, T0, 5 * MIN));
        // 2m later: suppressed, stamp unchanged.
        assert!(!table.try_acquire("a", AlertKind::Offline, T0 + 2 * MIN, 5 * MIN));
        assert_eq!(table.last("a", AlertKind::Offline), Some(T0));
        // 6m later: passes and restamps.
        assert!(table.try_acquire("a", AlertKind::Offline, T0 + 6 * MIN, 5 * MIN));
        assert_eq!(table.last("a", AlertKind::Offline), Some(T0 + 6 * MIN));
    }

    #[test]
    fn cooldown_is_per_store_and_per_kind() {
        let table = CooldownTable::new();
        assert!(table.try_acquire("a", AlertKind::Offline, T0, 5 * MIN));
        assert!(table.try_acquire("b", AlertKind::Offline, T0, 5 * MIN));
        assert!(table.try_acquire("a", AlertKind::Recovery, T0, 5 * MIN));
    }

    #[test]
    fn stamp_gates_the_following_acquire() {
        // First offline bypasses the gate but stamps; the repeat two minutes
        // later must be suppressed.
        let table = CooldownTable::new();
        table.stamp("a", AlertKind::Offline, T0);
        assert!(!table.try_acquire("a", AlertKind::Offline, T0 + 2 * MIN, 5 * MIN));
        assert!(table.try_acquire("a", AlertKind::Offline, T0 + 6 * MIN, 5 * MIN));
    }

    #[test]
    fn classify_startup() {
        let plan = classify(&TransitionEvent::Startup {
            store_id: "a".into(),
            store_name: "Store a".into(),
            heartbeat: heartbeat("a"),
        });
        assert_eq!(plan.kind, AlertKind::Startup);
        assert_eq!(plan.severity, AlertSeverity::Low);
        assert!(plan.telemetry_summary.is_some());
        assert!(!plan.bypass_cooldown);
    }

    #[test]
    fn classify_recovery_mentions_silence() {
        let plan = classify(&TransitionEvent::Recovery {
            store_id: "a".into(),
            store_name: "Store a".into(),
            heartbeat: heartbeat("a"),
            silent_for_ms: Some(17 * MIN),
        });
        assert_eq!(plan.kind, AlertKind::Recovery);
        assert_eq!(plan.severity, AlertSeverity::Medium);
        assert!(plan.message.contains("17m"));
    }

    #[test]
    fn classify_offline_first_bypasses_cooldown() {
        let plan = classify(&TransitionEvent::Offline {
            store_id: "a".into(),
            store_name: "Store a".into(),
            last_heartbeat: T0,
            silent_for_ms: 7 * MIN,
            repeat: false,
        });
        assert_eq!(plan.kind, AlertKind::Offline);
        assert_eq!(plan.severity, AlertSeverity::Critical);
        assert!(plan.bypass_cooldown);
        assert!(plan.message.contains("7m"));
    }

    #[test]
    fn classify_offline_repeat_is_gated() {
        let plan = classify(&TransitionEvent::Offline {
            store_id: "a".into(),
            store_name: "Store a".into(),
            last_heartbeat: T0,
            silent_for_ms: 75 * MIN,
            repeat: true,
        });
        assert!(!plan.bypass_cooldown);
        assert!(plan.message.contains("1h 15m"));
    }

    #[test]
    fn fmt_duration_ranges() {
        assert_eq!(fmt_duration(30_000), "30s");
        assert_eq!(fmt_duration(7 * MIN), "7m");
        assert_eq!(fmt_duration(135 * MIN), "2h 15m");
    }
}
