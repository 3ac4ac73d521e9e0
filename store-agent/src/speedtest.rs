//! Amortized network speed measurement
//!
//! Download throughput is sampled against a small set of probe URLs; a
//! sample is the arithmetic mean of the per-URL throughputs. Individual
//! probe failures are tolerated; a sample where every probe failed yields
//! `None`. Samples are expensive, so the shipper takes one at startup and
//! then on its 30-minute maintenance timer; heartbeats in between read the
//! cache.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::RwLock;
use shared::heartbeat::{SpeedSample, SPEED_HISTORY_LEN};
use shared::util::now_millis;

/// Probe endpoints serving a payload large enough to measure against.
const PROBE_URLS: &[&str] = &[
    "https://speed.cloudflare.com/__down?bytes=1000000",
    "https://proof.ovh.net/files/1Mb.dat",
];

/// Per-probe timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SpeedTester {
    client: reqwest::Client,
}

impl SpeedTester {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Take one speed sample: mean download throughput over the probe set,
    /// or `None` when every probe failed.
    pub async fn measure(&self) -> Option<f64> {
        let mut throughputs = Vec::with_capacity(PROBE_URLS.len());

        for url in PROBE_URLS {
            match self.probe(url).await {
                Ok(mbps) => throughputs.push(mbps),
                Err(e) => {
                    tracing::debug!(url, "Speed probe failed: {e}");
                }
            }
        }

        mean(&throughputs)
    }

    async fn probe(&self, url: &str) -> Result<f64, reqwest::Error> {
        let started = std::time::Instant::now();
        let body = self
            .client
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let secs = started.elapsed().as_secs_f64().max(0.001);
        Ok(body.len() as f64 * 8.0 / 1_000_000.0 / secs)
    }
}

impl Default for SpeedTester {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// In-memory cache of the current speed and the last few samples.
pub struct SpeedCache {
    inner: RwLock<CacheInner>,
}

struct CacheInner {
    current: Option<f64>,
    history: VecDeque<SpeedSample>,
}

impl SpeedCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                current: None,
                history: VecDeque::with_capacity(SPEED_HISTORY_LEN),
            }),
        }
    }

    /// Record a sample outcome. Failed samples (`None`) clear the current
    /// reading but keep the history.
    pub fn record(&self, speed_mbps: Option<f64>) {
        let mut inner = self.inner.write();
        inner.current = speed_mbps;
        if let Some(speed) = speed_mbps {
            if inner.history.len() == SPEED_HISTORY_LEN {
                inner.history.pop_front();
            }
            inner.history.push_back(SpeedSample {
                measured_at: now_millis(),
                speed_mbps: speed,
            });
        }
    }

    pub fn current(&self) -> Option<f64> {
        self.inner.read().current
    }

    pub fn history(&self) -> Vec<SpeedSample> {
        self.inner.read().history.iter().copied().collect()
    }

    /// Instant of the most recent successful sample, if any.
    pub fn last_sampled_at(&self) -> Option<i64> {
        self.inner.read().history.back().map(|s| s.measured_at)
    }
}

impl Default for SpeedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn mean_is_arithmetic() {
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }

    #[test]
    fn cache_keeps_last_five_samples() {
        let cache = SpeedCache::new();
        for i in 0..8 {
            cache.record(Some(i as f64));
        }
        let history = cache.history();
        assert_eq!(history.len(), SPEED_HISTORY_LEN);
        assert_eq!(history.first().unwrap().speed_mbps, 3.0);
        assert_eq!(history.last().unwrap().speed_mbps, 7.0);
        assert_eq!(cache.current(), Some(7.0));
    }

    #[test]
    fn failed_sample_clears_current_but_keeps_history() {
        let cache = SpeedCache::new();
        assert_eq!(cache.last_sampled_at(), None);

        cache.record(Some(50.0));
        let sampled_at = cache.last_sampled_at();
        assert!(sampled_at.is_some());

        cache.record(None);
        assert_eq!(cache.current(), None);
        assert_eq!(cache.history().len(), 1);
        assert_eq!(cache.last_sampled_at(), sampled_at);
    }
}
