//! Heartbeat wire model
//!
//! The heartbeat is the single record a store agent ships to the monitoring
//! server: identity, a telemetry snapshot, camera health and application
//! counters. Produced by the agent's collector, consumed by the server's
//! ingestion endpoint, and archived verbatim as JSON in heartbeat history.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Maximum number of speed samples carried in [`NetworkInfo::speed_history`].
pub const SPEED_HISTORY_LEN: usize = 5;

/// A single liveness + health report from a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Opaque fleet-unique store identifier
    pub store_id: String,
    /// Display label for dashboards and alert mails
    pub store_name: String,
    /// Client wall-clock at emission (UTC millis)
    pub timestamp: i64,
    /// True for the first heartbeat after agent process start; stays true
    /// until one delivery succeeds
    #[serde(default)]
    pub is_startup: bool,
    pub system_stats: SystemStats,
    pub camera_status: CameraStatus,
    pub application_stats: ApplicationStats,
    pub location_info: LocationInfo,
    pub network_info: NetworkInfo,
}

/// OS-level telemetry. Every field the collector could not read is `None`;
/// collection never fails the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub memory_available_gb: Option<f64>,
    pub disk_free_gb: Option<f64>,
    pub disk_usage_percent: Option<f64>,
    pub process_memory_mb: Option<f64>,
    pub uptime_hours: Option<f64>,
    pub network_connected: bool,
    pub network_speed_mbps: Option<f64>,
}

/// Aggregate camera health plus per-camera detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraStatus {
    pub total_cameras: u32,
    pub active_cameras: u32,
    #[serde(default)]
    pub cameras: Vec<CameraInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters maintained by the detection application embedding the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationStats {
    /// UTC millis of the most recent detection, if any
    pub last_detection_time: Option<i64>,
    pub total_detections_today: u64,
    pub app_version: String,
    pub runtime_version: String,
    /// Consecutive failed deliveries to the monitoring server
    pub consecutive_failures: u32,
    /// UTC millis of the last successful delivery, if any
    pub last_successful_connection: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationInfo {
    pub timezone: String,
    /// Local wall-clock rendered in the store's timezone
    pub local_time: String,
}

/// Network speed measurements (amortized; see the agent's speed probe).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub current_speed_mbps: Option<f64>,
    #[serde(default)]
    pub speed_history: Vec<SpeedSample>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpeedSample {
    /// UTC millis when the sample was taken
    pub measured_at: i64,
    pub speed_mbps: f64,
}

/// Ack returned by both ingestion endpoints. Carried purely for client
/// observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub status: String,
    pub total_stores_monitored: usize,
}

impl Heartbeat {
    /// Validate the wire invariants before the record reaches the registry.
    ///
    /// Rejects empty identity, camera counts where active exceeds total, and
    /// out-of-range percentages.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.store_id.trim().is_empty() {
            return Err(AppError::validation("store_id must not be empty")
                .with_detail("field", "store_id"));
        }
        if self.camera_status.active_cameras > self.camera_status.total_cameras {
            return Err(AppError::validation(format!(
                "active_cameras ({}) exceeds total_cameras ({})",
                self.camera_status.active_cameras, self.camera_status.total_cameras
            )));
        }
        for (name, value) in [
            ("cpu_percent", self.system_stats.cpu_percent),
            ("memory_percent", self.system_stats.memory_percent),
            ("disk_usage_percent", self.system_stats.disk_usage_percent),
        ] {
            if let Some(v) = value
                && !(0.0..=100.0).contains(&v)
            {
                return Err(AppError::validation(format!("{name} out of range: {v}"))
                    .with_detail("field", name));
            }
        }
        Ok(())
    }

    /// One-line telemetry summary used in alert mail bodies.
    pub fn telemetry_summary(&self) -> String {
        let fmt_pct = |v: Option<f64>| {
            v.map(|p| format!("{p:.1}%"))
                .unwrap_or_else(|| "n/a".to_string())
        };
        let fmt_gb = |v: Option<f64>| {
            v.map(|g| format!("{g:.1} GB"))
                .unwrap_or_else(|| "n/a".to_string())
        };
        format!(
            "CPU {} | Mem {} | Disk free {} | Cameras {}/{} | Detections today {}",
            fmt_pct(self.system_stats.cpu_percent),
            fmt_pct(self.system_stats.memory_percent),
            fmt_gb(self.system_stats.disk_free_gb),
            self.camera_status.active_cameras,
            self.camera_status.total_cameras,
            self.application_stats.total_detections_today,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Heartbeat {
        Heartbeat {
            store_id: "st-001".into(),
            store_name: "Main Street".into(),
            timestamp: 1_750_000_000_000,
            is_startup: false,
            system_stats: SystemStats {
                cpu_percent: Some(12.5),
                memory_percent: Some(48.0),
                memory_available_gb: Some(7.9),
                disk_free_gb: Some(120.0),
                disk_usage_percent: Some(55.0),
                process_memory_mb: Some(230.0),
                uptime_hours: Some(36.5),
                network_connected: true,
                network_speed_mbps: Some(94.2),
            },
            camera_status: CameraStatus {
                total_cameras: 4,
                active_cameras: 3,
                cameras: vec![
                    CameraInfo {
                        id: "cam-1".into(),
                        active: true,
                        error: None,
                    },
                    CameraInfo {
                        id: "cam-4".into(),
                        active: false,
                        error: Some("rtsp timeout".into()),
                    },
                ],
            },
            application_stats: ApplicationStats {
                last_detection_time: Some(1_749_999_000_000),
                total_detections_today: 812,
                app_version: "2.3.1".into(),
                runtime_version: "1.80".into(),
                consecutive_failures: 0,
                last_successful_connection: Some(1_749_999_900_000),
            },
            location_info: LocationInfo {
                timezone: "Europe/Madrid".into(),
                local_time: "2025-06-15 16:26:40".into(),
            },
            network_info: NetworkInfo {
                current_speed_mbps: Some(94.2),
                speed_history: vec![SpeedSample {
                    measured_at: 1_749_998_000_000,
                    speed_mbps: 94.2,
                }],
            },
        }
    }

    #[test]
    fn json_roundtrip_is_semantically_stable() {
        let hb = sample();
        let json = serde_json::to_string(&hb).unwrap();
        let back: Heartbeat = serde_json::from_str(&json).unwrap();
        assert_eq!(back.store_id, hb.store_id);
        assert_eq!(back.timestamp, hb.timestamp);
        assert_eq!(back.camera_status.active_cameras, 3);
        assert_eq!(back.network_info.speed_history.len(), 1);
        assert_eq!(
            back.application_stats.total_detections_today,
            hb.application_stats.total_detections_today
        );
    }

    #[test]
    fn validate_accepts_sane_heartbeat() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_store_id() {
        let mut hb = sample();
        hb.store_id = "  ".into();
        assert!(hb.validate().is_err());
    }

    #[test]
    fn validate_rejects_camera_count_inversion() {
        let mut hb = sample();
        hb.camera_status.active_cameras = 9;
        assert!(hb.validate().is_err());
    }

    #[test]
    fn validate_rejects_percentage_out_of_range() {
        let mut hb = sample();
        hb.system_stats.cpu_percent = Some(140.0);
        assert!(hb.validate().is_err());
    }

    #[test]
    fn missing_optional_fields_deserialize_as_none() {
        // A minimal payload from an older agent build.
        let json = r#"{
            "store_id": "st-002",
            "store_name": "Harbor",
            "timestamp": 1750000000000,
            "system_stats": {"network_connected": false},
            "camera_status": {"total_cameras": 0, "active_cameras": 0},
            "application_stats": {
                "last_detection_time": null,
                "total_detections_today": 0,
                "app_version": "2.0.0",
                "runtime_version": "1.75",
                "consecutive_failures": 3,
                "last_successful_connection": null
            },
            "location_info": {"timezone": "UTC", "local_time": ""},
            "network_info": {"current_speed_mbps": null}
        }"#;
        let hb: Heartbeat = serde_json::from_str(json).unwrap();
        assert!(!hb.is_startup);
        assert!(hb.system_stats.cpu_percent.is_none());
        assert!(hb.network_info.speed_history.is_empty());
        assert!(hb.validate().is_ok());
    }

    #[test]
    fn telemetry_summary_handles_missing_metrics() {
        let mut hb = sample();
        hb.system_stats.cpu_percent = None;
        let summary = hb.telemetry_summary();
        assert!(summary.contains("CPU n/a"));
        assert!(summary.contains("Cameras 3/4"));
    }
}
