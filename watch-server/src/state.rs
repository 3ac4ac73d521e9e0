//! Application state for watch-server

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::dispatcher::AlertDispatcher;
use crate::recipients::RecipientsConfig;
use crate::registry::LivenessRegistry;
use shared::util::now_millis;

/// Shared application state, cheap to clone into handlers and workers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub registry: Arc<LivenessRegistry>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub recipients: Arc<RecipientsConfig>,
    pub counters: Arc<Counters>,
}

/// Process-lifetime counters surfaced by `/health`.
pub struct Counters {
    pub started_at: i64,
    heartbeats_received: AtomicU64,
    buffered_replays: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started_at: now_millis(),
            heartbeats_received: AtomicU64::new(0),
            buffered_replays: AtomicU64::new(0),
        }
    }

    pub fn record_heartbeat(&self, replay: bool) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
        if replay {
            self.buffered_replays.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn heartbeats_received(&self) -> u64 {
        self.heartbeats_received.load(Ordering::Relaxed)
    }

    pub fn buffered_replays(&self) -> u64 {
        self.buffered_replays.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> i64 {
        (now_millis() - self.started_at) / 1000
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}
