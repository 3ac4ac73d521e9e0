//! Heartbeat shipper — periodic emit, buffer flush, maintenance
//!
//! Drives the agent: every interval collect a heartbeat and POST it live;
//! on failure buffer it locally; after every successful live send drain a
//! batch of buffered heartbeats to the replay endpoint. A separate
//! maintenance timer garbage-collects the buffer and refreshes the network
//! speed sample. On shutdown the shipper attempts one final drain before
//! releasing the buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::app_status::AppStatus;
use crate::buffer::{HeartbeatBuffer, RETENTION_MS};
use crate::collector::TelemetryCollector;
use crate::config::AgentConfig;
use crate::speedtest::{SpeedCache, SpeedTester};
use shared::heartbeat::HeartbeatAck;
use shared::util::now_millis;

/// Timeout for the live heartbeat POST.
const LIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout per buffered replay POST.
const REPLAY_TIMEOUT: Duration = Duration::from_secs(5);
/// Max buffered heartbeats replayed after one successful live send.
const DRAIN_BATCH: i64 = 10;
/// Maintenance cadence: buffer GC + speed re-measurement.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct HeartbeatShipper {
    config: Arc<AgentConfig>,
    collector: TelemetryCollector,
    buffer: Arc<HeartbeatBuffer>,
    app: AppStatus,
    speed_tester: SpeedTester,
    speed_cache: Arc<SpeedCache>,
    client: reqwest::Client,
}

impl HeartbeatShipper {
    pub fn new(
        config: Arc<AgentConfig>,
        collector: TelemetryCollector,
        buffer: Arc<HeartbeatBuffer>,
        app: AppStatus,
        speed_cache: Arc<SpeedCache>,
    ) -> Self {
        Self {
            config,
            collector,
            buffer,
            app,
            speed_tester: SpeedTester::new(),
            speed_cache,
            client: reqwest::Client::new(),
        }
    }

    /// Main run loop — collect/send on the heartbeat timer, maintain on the
    /// slow timer, final drain on shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            store_id = %self.config.store_id,
            server = %self.config.server_url,
            interval_secs = self.config.heartbeat_interval.as_secs(),
            "Heartbeat shipper started"
        );

        // First sample before the first heartbeat so it carries a speed
        // reading; afterwards the maintenance timer refreshes the cache.
        self.speed_cache.record(self.speed_tester.measure().await);

        // True until one delivery succeeds, however many attempts that takes.
        let mut is_startup = true;

        let mut heartbeat_tick = tokio::time::interval(self.config.heartbeat_interval);
        let mut maintenance_tick = tokio::time::interval(MAINTENANCE_INTERVAL);
        maintenance_tick.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.final_drain().await;
                    break;
                }
                _ = heartbeat_tick.tick() => {
                    self.beat(&mut is_startup).await;
                }
                _ = maintenance_tick.tick() => {
                    self.maintain().await;
                }
            }
        }

        self.buffer.close().await;
        tracing::info!("Heartbeat shipper stopped");
    }

    /// One heartbeat cycle: collect, try live delivery, buffer on failure,
    /// drain on success.
    async fn beat(&self, is_startup: &mut bool) {
        let heartbeat = self.collector.collect(*is_startup);

        match self.post_live(&heartbeat).await {
            Ok(ack) => {
                // The startup flag clears only on a confirmed delivery.
                *is_startup = false;
                self.app.record_success(now_millis());
                tracing::debug!(
                    fleet_size = ack.total_stores_monitored,
                    "Heartbeat delivered"
                );
                self.drain_buffer().await;
            }
            Err(e) => {
                let streak = self.app.record_failure();
                tracing::warn!(
                    consecutive_failures = streak,
                    "Heartbeat delivery failed, buffering: {e}"
                );
                self.buffer.enqueue(&heartbeat, now_millis()).await;
            }
        }
    }

    async fn post_live(
        &self,
        heartbeat: &shared::heartbeat::Heartbeat,
    ) -> Result<HeartbeatAck, reqwest::Error> {
        self.client
            .post(self.config.live_endpoint())
            .timeout(LIVE_TIMEOUT)
            .json(heartbeat)
            .send()
            .await?
            .error_for_status()?
            .json::<HeartbeatAck>()
            .await
    }

    /// Replay the oldest buffered batch. Stops at the first network-class
    /// failure (the server just went away again); a rejected payload is
    /// marked sent and skipped so one poison entry cannot wedge the queue.
    async fn drain_buffer(&self) {
        let batch = self.buffer.peek(DRAIN_BATCH).await;
        if batch.is_empty() {
            return;
        }

        let total = batch.len();
        let mut replayed = 0;

        for entry in batch {
            let response = self
                .client
                .post(self.config.buffered_endpoint())
                .timeout(REPLAY_TIMEOUT)
                .header("content-type", "application/json")
                .body(entry.payload.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    self.buffer.mark_sent(entry.seq).await;
                    replayed += 1;
                }
                Ok(resp) => {
                    // The server answered but refused the payload; retrying
                    // it forever would block everything behind it.
                    tracing::warn!(
                        seq = entry.seq,
                        status = %resp.status(),
                        "Buffered heartbeat rejected, skipping"
                    );
                    self.buffer.mark_sent(entry.seq).await;
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    tracing::debug!(
                        seq = entry.seq,
                        "Network failure during drain, leaving rest for next tick: {e}"
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(seq = entry.seq, "Replay failed, skipping entry: {e}");
                    self.buffer.mark_sent(entry.seq).await;
                }
            }
        }

        if replayed > 0 {
            tracing::info!(replayed, of = total, "Buffered heartbeats replayed");
        }
    }

    /// Slow-path upkeep: expire old buffer rows and refresh the speed sample.
    async fn maintain(&self) {
        let deleted = self.buffer.gc(RETENTION_MS, now_millis()).await;
        if deleted > 0 {
            tracing::info!(deleted, "Expired buffered heartbeats removed");
        }
        self.speed_cache.record(self.speed_tester.measure().await);
    }

    /// Last chance to empty the buffer before the process exits.
    async fn final_drain(&self) {
        let pending = self.buffer.pending().await;
        if pending == 0 {
            return;
        }
        tracing::info!(pending, "Final buffer drain before shutdown");
        self.drain_buffer().await;
    }
}
