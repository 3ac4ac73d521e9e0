//! Shared application status handle
//!
//! The detection application embedding the agent updates counters and camera
//! health through this handle; the telemetry collector reads them when
//! building a heartbeat. All fields are lock-free or behind a short-lived
//! lock so updates from the detection hot path stay cheap.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use shared::heartbeat::{ApplicationStats, CameraInfo, CameraStatus};

/// Sentinel for "no instant recorded" in the atomic timestamp fields.
const NEVER: i64 = 0;

#[derive(Clone)]
pub struct AppStatus {
    inner: Arc<Inner>,
}

struct Inner {
    detections_today: AtomicU64,
    last_detection: AtomicI64,
    consecutive_failures: AtomicU32,
    last_successful_connection: AtomicI64,
    cameras: RwLock<Vec<CameraInfo>>,
    app_version: String,
}

impl AppStatus {
    pub fn new(app_version: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                detections_today: AtomicU64::new(0),
                last_detection: AtomicI64::new(NEVER),
                consecutive_failures: AtomicU32::new(0),
                last_successful_connection: AtomicI64::new(NEVER),
                cameras: RwLock::new(Vec::new()),
                app_version,
            }),
        }
    }

    /// Called by the detection pipeline on every detection.
    pub fn record_detection(&self, now: i64) {
        self.inner.detections_today.fetch_add(1, Ordering::Relaxed);
        self.inner.last_detection.store(now, Ordering::Relaxed);
    }

    /// Daily counter reset, driven by the embedding application.
    pub fn reset_daily_counters(&self) {
        self.inner.detections_today.store(0, Ordering::Relaxed);
    }

    /// Replace the camera health snapshot.
    pub fn set_cameras(&self, cameras: Vec<CameraInfo>) {
        *self.inner.cameras.write() = cameras;
    }

    /// Shipper: a delivery succeeded.
    pub fn record_success(&self, now: i64) {
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        self.inner
            .last_successful_connection
            .store(now, Ordering::Relaxed);
    }

    /// Shipper: a delivery failed. Returns the new failure streak.
    pub fn record_failure(&self) -> u32 {
        self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn last_successful_connection(&self) -> Option<i64> {
        match self.inner.last_successful_connection.load(Ordering::Relaxed) {
            NEVER => None,
            ts => Some(ts),
        }
    }

    pub fn application_stats(&self, runtime_version: &str) -> ApplicationStats {
        let last_detection = self.inner.last_detection.load(Ordering::Relaxed);
        ApplicationStats {
            last_detection_time: (last_detection != NEVER).then_some(last_detection),
            total_detections_today: self.inner.detections_today.load(Ordering::Relaxed),
            app_version: self.inner.app_version.clone(),
            runtime_version: runtime_version.to_string(),
            consecutive_failures: self.consecutive_failures(),
            last_successful_connection: self.last_successful_connection(),
        }
    }

    pub fn camera_status(&self) -> CameraStatus {
        let cameras = self.inner.cameras.read().clone();
        CameraStatus {
            total_cameras: cameras.len() as u32,
            active_cameras: cameras.iter().filter(|c| c.active).count() as u32,
            cameras,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_counters_accumulate() {
        let status = AppStatus::new("1.0.0".into());
        status.record_detection(100);
        status.record_detection(200);

        let stats = status.application_stats("rust");
        assert_eq!(stats.total_detections_today, 2);
        assert_eq!(stats.last_detection_time, Some(200));

        status.reset_daily_counters();
        assert_eq!(status.application_stats("rust").total_detections_today, 0);
    }

    #[test]
    fn failure_streak_resets_on_success() {
        let status = AppStatus::new("1.0.0".into());
        assert_eq!(status.record_failure(), 1);
        assert_eq!(status.record_failure(), 2);
        status.record_success(500);
        assert_eq!(status.consecutive_failures(), 0);
        assert_eq!(status.last_successful_connection(), Some(500));
    }

    #[test]
    fn camera_status_counts_active() {
        let status = AppStatus::new("1.0.0".into());
        status.set_cameras(vec![
            CameraInfo {
                id: "cam-1".into(),
                active: true,
                error: None,
            },
            CameraInfo {
                id: "cam-2".into(),
                active: false,
                error: Some("no signal".into()),
            },
        ]);

        let cameras = status.camera_status();
        assert_eq!(cameras.total_cameras, 2);
        assert_eq!(cameras.active_cameras, 1);
    }

    #[test]
    fn fresh_status_has_no_instants() {
        let status = AppStatus::new("1.0.0".into());
        let stats = status.application_stats("rust");
        assert_eq!(stats.last_detection_time, None);
        assert_eq!(stats.last_successful_connection, None);
    }
}
