//! Alert taxonomy and store liveness status
//!
//! Shared between the server's registry/dispatcher and the HTTP API so the
//! persisted rows, the wire JSON and the in-memory state all speak the same
//! vocabulary. The persisted `alert_type` column carries the full kind set,
//! including `startup` and `recovery`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness status of a store as tracked by the registry.
///
/// `Unknown` is the state of a record hydrated from persistence after a
/// server restart, before any heartbeat or sweep has judged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Online,
    Offline,
    Unknown,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a persisted status string, tolerating unknown values.
    pub fn parse(s: &str) -> Self {
        match s {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an alert, in-memory and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A client process has just begun emitting heartbeats (not an outage
    /// recovery)
    Startup,
    /// A previously offline store resumed heartbeating
    Recovery,
    /// A store stopped heartbeating past the alert threshold
    Offline,
    SystemWarning,
    CameraFailure,
    /// Operator-triggered test alert
    Test,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Recovery => "recovery",
            Self::Offline => "offline",
            Self::SystemWarning => "system_warning",
            Self::CameraFailure => "camera_failure",
            Self::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "startup" => Some(Self::Startup),
            "recovery" => Some(Self::Recovery),
            "offline" => Some(Self::Offline),
            "system_warning" => Some(Self::SystemWarning),
            "camera_failure" => Some(Self::CameraFailure),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Default severity assigned when the dispatcher is not given one.
    pub fn default_severity(&self) -> AlertSeverity {
        match self {
            Self::Startup | Self::Test => AlertSeverity::Low,
            Self::Recovery => AlertSeverity::Medium,
            Self::SystemWarning | Self::CameraFailure => AlertSeverity::High,
            Self::Offline => AlertSeverity::Critical,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "critical" => Self::Critical,
            _ => Self::High,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted alert record, as returned by the alerts API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub store_id: String,
    /// Display name joined from the stores table; empty when the store row
    /// is gone
    #[serde(default)]
    pub store_name: String,
    pub alert_type: AlertKind,
    pub message: String,
    pub severity: AlertSeverity,
    pub resolved: bool,
    pub resolved_at: Option<i64>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_tolerates_garbage() {
        assert_eq!(StoreStatus::parse("online"), StoreStatus::Online);
        assert_eq!(StoreStatus::parse("offline"), StoreStatus::Offline);
        assert_eq!(StoreStatus::parse("???"), StoreStatus::Unknown);
    }

    #[test]
    fn kind_string_roundtrip() {
        for kind in [
            AlertKind::Startup,
            AlertKind::Recovery,
            AlertKind::Offline,
            AlertKind::SystemWarning,
            AlertKind::CameraFailure,
            AlertKind::Test,
        ] {
            assert_eq!(AlertKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AlertKind::parse("bogus"), None);
    }

    #[test]
    fn kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&AlertKind::CameraFailure).unwrap();
        assert_eq!(json, "\"camera_failure\"");
    }

    #[test]
    fn default_severities_match_policy() {
        assert_eq!(AlertKind::Startup.default_severity(), AlertSeverity::Low);
        assert_eq!(AlertKind::Recovery.default_severity(), AlertSeverity::Medium);
        assert_eq!(AlertKind::Offline.default_severity(), AlertSeverity::Critical);
    }

    #[test]
    fn severity_ordering() {
        assert!(AlertSeverity::Low < AlertSeverity::Critical);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
    }
}
