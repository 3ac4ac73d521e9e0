//! Durable heartbeat buffer — FIFO queue with replay watermark
//!
//! Heartbeats that could not be delivered are appended here and replayed in
//! ascending sequence order once the server is reachable again. The queue is
//! an append-only SQLite log with an advancing `sent` watermark; rows are
//! garbage-collected after a retention window rather than on ack, which is
//! what makes delivery at-least-once (a mark that never lands is harmlessly
//! re-sent after restart).
//!
//! When SQLite cannot be opened at all the agent degrades to an in-memory
//! ring capped at [`MEMORY_CAP`] entries — a documented data-loss mode that
//! keeps heartbeating alive on a broken disk.

use std::collections::{HashSet, VecDeque};
use std::str::FromStr;

use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use shared::heartbeat::Heartbeat;

/// In-memory fallback capacity.
const MEMORY_CAP: usize = 100;
/// FIFO trim target when the fallback ring overflows.
const MEMORY_TRIM_TO: usize = 50;

/// Default retention for replayed and stale entries.
pub const RETENTION_MS: i64 = 24 * 3600 * 1000;

/// One buffered heartbeat, as stored.
#[derive(Debug, Clone)]
pub struct BufferedHeartbeat {
    /// Monotonic sequence (SQLite rowid or ring counter)
    pub seq: i64,
    /// Client emission instant of the buffered heartbeat
    pub timestamp: i64,
    /// Heartbeat serialized as JSON
    pub payload: String,
    pub sent: bool,
}

impl BufferedHeartbeat {
    /// Decode the payload back into a heartbeat.
    pub fn heartbeat(&self) -> Result<Heartbeat, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

enum Backend {
    Durable(SqlitePool),
    Memory(Mutex<MemoryRing>),
}

pub struct HeartbeatBuffer {
    backend: Backend,
    /// Seqs acked by the server this process, kept so an entry whose
    /// `sent` update failed is not replayed again before restart.
    replayed: Mutex<HashSet<i64>>,
}

impl HeartbeatBuffer {
    /// Open the durable buffer at `path`, falling back to the in-memory
    /// ring when SQLite is unavailable.
    pub async fn open(path: &str) -> Self {
        match Self::open_durable(path).await {
            Ok(pool) => {
                tracing::info!(path, "Heartbeat buffer opened");
                Self {
                    backend: Backend::Durable(pool),
                    replayed: Mutex::new(HashSet::new()),
                }
            }
            Err(e) => {
                tracing::error!(
                    path,
                    "Cannot open durable buffer, falling back to in-memory ring \
                     (heartbeats will be lost on restart): {e}"
                );
                Self {
                    backend: Backend::Memory(Mutex::new(MemoryRing::new())),
                    replayed: Mutex::new(HashSet::new()),
                }
            }
        }
    }

    async fn open_durable(path: &str) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS heartbeat_buffer (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  BIGINT NOT NULL,
                data       TEXT NOT NULL,
                sent       INTEGER NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    /// In-memory SQLite buffer for tests.
    #[cfg(test)]
    pub async fn open_in_memory() -> Self {
        let pool = Self::open_durable("sqlite::memory:").await.unwrap();
        Self {
            backend: Backend::Durable(pool),
            replayed: Mutex::new(HashSet::new()),
        }
    }

    /// Force the ring fallback (tests).
    #[cfg(test)]
    pub fn memory_only() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(MemoryRing::new())),
            replayed: Mutex::new(HashSet::new()),
        }
    }

    /// Append a heartbeat that could not be delivered. Failures are logged
    /// and swallowed — the next tick still attempts a live send, so a broken
    /// buffer degrades delivery to best-effort rather than stopping it.
    pub async fn enqueue(&self, heartbeat: &Heartbeat, now: i64) -> Option<i64> {
        let payload = match serde_json::to_string(heartbeat) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Cannot serialize heartbeat for buffering: {e}");
                return None;
            }
        };

        match &self.backend {
            Backend::Durable(pool) => {
                let result = sqlx::query(
                    "INSERT INTO heartbeat_buffer (timestamp, data, sent, created_at) VALUES (?, ?, 0, ?)",
                )
                .bind(heartbeat.timestamp)
                .bind(&payload)
                .bind(now)
                .execute(pool)
                .await;

                match result {
                    Ok(done) => {
                        let seq = done.last_insert_rowid();
                        tracing::debug!(seq, "Heartbeat buffered");
                        Some(seq)
                    }
                    Err(e) => {
                        tracing::error!("Failed to buffer heartbeat: {e}");
                        None
                    }
                }
            }
            Backend::Memory(ring) => Some(ring.lock().push(heartbeat.timestamp, payload)),
        }
    }

    /// Up to `n` unsent entries in ascending sequence order. Entries already
    /// acked this process are excluded even when their `sent` update failed.
    pub async fn peek(&self, n: i64) -> Vec<BufferedHeartbeat> {
        match &self.backend {
            Backend::Durable(pool) => {
                let rows: Result<Vec<(i64, i64, String)>, _> = sqlx::query_as(
                    "SELECT id, timestamp, data FROM heartbeat_buffer WHERE sent = 0 ORDER BY id ASC LIMIT ?",
                )
                .bind(n)
                .fetch_all(pool)
                .await;

                match rows {
                    Ok(rows) => {
                        let replayed = self.replayed.lock();
                        rows.into_iter()
                            .filter(|(seq, _, _)| !replayed.contains(seq))
                            .map(|(seq, timestamp, payload)| BufferedHeartbeat {
                                seq,
                                timestamp,
                                payload,
                                sent: false,
                            })
                            .collect()
                    }
                    Err(e) => {
                        tracing::error!("Failed to read heartbeat buffer: {e}");
                        Vec::new()
                    }
                }
            }
            Backend::Memory(ring) => ring.lock().peek(n as usize),
        }
    }

    /// Mark an entry as replayed. Idempotent; a failed mark is only logged
    /// and the seq remembered in memory, so the entry does not resurface
    /// before restart — after restart it is harmlessly re-sent and the
    /// server tolerates the duplicate.
    pub async fn mark_sent(&self, seq: i64) {
        match &self.backend {
            Backend::Durable(pool) => {
                if let Err(e) = sqlx::query("UPDATE heartbeat_buffer SET sent = 1 WHERE id = ?")
                    .bind(seq)
                    .execute(pool)
                    .await
                {
                    self.replayed.lock().insert(seq);
                    tracing::warn!(seq, "Failed to mark heartbeat sent: {e}");
                }
            }
            Backend::Memory(ring) => ring.lock().mark_sent(seq),
        }
    }

    /// Delete entries older than the retention window, sent or not.
    /// Returns the number of rows removed.
    pub async fn gc(&self, retention_ms: i64, now: i64) -> u64 {
        let cutoff = now - retention_ms;
        match &self.backend {
            Backend::Durable(pool) => {
                match sqlx::query("DELETE FROM heartbeat_buffer WHERE created_at < ?")
                    .bind(cutoff)
                    .execute(pool)
                    .await
                {
                    Ok(done) => done.rows_affected(),
                    Err(e) => {
                        tracing::warn!("Buffer GC failed: {e}");
                        0
                    }
                }
            }
            Backend::Memory(ring) => ring.lock().gc(cutoff),
        }
    }

    /// Unsent entries currently waiting for replay.
    pub async fn pending(&self) -> u64 {
        match &self.backend {
            Backend::Durable(pool) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM heartbeat_buffer WHERE sent = 0",
                )
                .fetch_one(pool)
                .await
                .unwrap_or(0) as u64
            }
            Backend::Memory(ring) => ring.lock().pending(),
        }
    }

    /// Release the underlying store.
    pub async fn close(&self) {
        if let Backend::Durable(pool) = &self.backend {
            pool.close().await;
        }
    }
}

/// Bounded FIFO fallback used when SQLite is unavailable.
struct MemoryRing {
    entries: VecDeque<(BufferedHeartbeat, i64)>,
    next_seq: i64,
}

impl MemoryRing {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 1,
        }
    }

    fn push(&mut self, timestamp: i64, payload: String) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back((
            BufferedHeartbeat {
                seq,
                timestamp,
                payload,
                sent: false,
            },
            timestamp,
        ));

        if self.entries.len() > MEMORY_CAP {
            let dropped = self.entries.len() - MEMORY_TRIM_TO;
            self.entries.drain(..dropped);
            tracing::warn!(dropped, "In-memory buffer overflow, oldest entries dropped");
        }
        seq
    }

    fn peek(&self, n: usize) -> Vec<BufferedHeartbeat> {
        self.entries
            .iter()
            .filter(|(e, _)| !e.sent)
            .take(n)
            .map(|(e, _)| e.clone())
            .collect()
    }

    fn mark_sent(&mut self, seq: i64) {
        if let Some((entry, _)) = self.entries.iter_mut().find(|(e, _)| e.seq == seq) {
            entry.sent = true;
        }
    }

    fn gc(&mut self, cutoff: i64) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|(_, created_at)| *created_at >= cutoff);
        (before - self.entries.len()) as u64
    }

    fn pending(&self) -> u64 {
        self.entries.iter().filter(|(e, _)| !e.sent).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::heartbeat::{
        ApplicationStats, CameraStatus, LocationInfo, NetworkInfo, SystemStats,
    };

    fn heartbeat(ts: i64) -> Heartbeat {
        Heartbeat {
            store_id: "st-1".into(),
            store_name: "Store 1".into(),
            timestamp: ts,
            is_startup: false,
            system_stats: SystemStats::default(),
            camera_status: CameraStatus::default(),
            application_stats: ApplicationStats::default(),
            location_info: LocationInfo::default(),
            network_info: NetworkInfo::default(),
        }
    }

    #[tokio::test]
    async fn enqueue_peek_preserves_fifo_order() {
        let buffer = HeartbeatBuffer::open_in_memory().await;
        for i in 0..5 {
            buffer.enqueue(&heartbeat(1000 + i), 2000 + i).await.unwrap();
        }

        let batch = buffer.peek(3).await;
        assert_eq!(batch.len(), 3);
        assert!(batch.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(batch[0].timestamp, 1000);
    }

    #[tokio::test]
    async fn mark_sent_removes_from_peek_and_is_idempotent() {
        let buffer = HeartbeatBuffer::open_in_memory().await;
        let seq = buffer.enqueue(&heartbeat(1000), 2000).await.unwrap();
        buffer.enqueue(&heartbeat(1001), 2001).await.unwrap();

        buffer.mark_sent(seq).await;
        buffer.mark_sent(seq).await;

        let remaining = buffer.peek(10).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, 1001);
        assert_eq!(buffer.pending().await, 1);
    }

    #[tokio::test]
    async fn gc_deletes_expired_entries_sent_or_not() {
        let buffer = HeartbeatBuffer::open_in_memory().await;
        let old_seq = buffer.enqueue(&heartbeat(1), 1_000).await.unwrap();
        buffer.mark_sent(old_seq).await;
        buffer.enqueue(&heartbeat(2), 2_000).await.unwrap();
        buffer.enqueue(&heartbeat(3), 500_000).await.unwrap();

        let now = RETENTION_MS + 100_000;
        let deleted = buffer.gc(RETENTION_MS, now).await;
        assert_eq!(deleted, 2);
        assert_eq!(buffer.peek(10).await.len(), 1);
    }

    #[tokio::test]
    async fn payload_roundtrips_through_buffer() {
        let buffer = HeartbeatBuffer::open_in_memory().await;
        let original = heartbeat(42);
        buffer.enqueue(&original, 100).await.unwrap();

        let stored = buffer.peek(1).await.remove(0);
        let decoded = stored.heartbeat().unwrap();
        assert_eq!(decoded.store_id, original.store_id);
        assert_eq!(decoded.timestamp, 42);
    }

    #[tokio::test]
    async fn memory_ring_trims_fifo_on_overflow() {
        let buffer = HeartbeatBuffer::memory_only();
        for i in 0..(MEMORY_CAP as i64 + 1) {
            buffer.enqueue(&heartbeat(i), i).await.unwrap();
        }

        // Overflow trims down to MEMORY_TRIM_TO, dropping the oldest.
        assert_eq!(buffer.pending().await, MEMORY_TRIM_TO as u64);
        let batch = buffer.peek(1).await;
        assert_eq!(batch[0].timestamp, MEMORY_CAP as i64 + 1 - MEMORY_TRIM_TO as i64);
    }

    #[tokio::test]
    async fn memory_ring_supports_mark_and_gc() {
        let buffer = HeartbeatBuffer::memory_only();
        let seq = buffer.enqueue(&heartbeat(10), 10).await.unwrap();
        buffer.enqueue(&heartbeat(20), 20_000).await.unwrap();

        buffer.mark_sent(seq).await;
        assert_eq!(buffer.pending().await, 1);

        let deleted = buffer.gc(1_000, 10_000).await;
        assert_eq!(deleted, 1);
    }
}
