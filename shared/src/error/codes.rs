//! Unified error codes for the monitoring platform
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Store / heartbeat errors
//! - 2xxx: Alert / notification errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 4,

    // ==================== 1xxx: Store / heartbeat ====================
    /// Store not found in the registry or persistence
    StoreNotFound = 1001,
    /// Heartbeat payload failed validation
    HeartbeatInvalid = 1002,

    // ==================== 2xxx: Alert / notification ====================
    /// No recipients configured for the store (and no default)
    NoRecipients = 2001,
    /// Recipients config file missing or unparseable
    RecipientsConfigInvalid = 2002,
    /// Notification delivery failed
    NotificationFailed = 2003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database operation failed
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Network error
    NetworkError = 9004,
    /// Operation timed out
    TimeoutError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default human-readable message for this code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "OK",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::InvalidRequest => "Invalid request",

            Self::StoreNotFound => "Store not found",
            Self::HeartbeatInvalid => "Heartbeat payload invalid",

            Self::NoRecipients => "No alert recipients configured",
            Self::RecipientsConfigInvalid => "Recipients config invalid",
            Self::NotificationFailed => "Notification delivery failed",

            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database operation failed",
            Self::ConfigError => "Configuration error",
            Self::NetworkError => "Network error",
            Self::TimeoutError => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when a u16 does not map to a known [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::InvalidRequest),
            1001 => Ok(Self::StoreNotFound),
            1002 => Ok(Self::HeartbeatInvalid),
            2001 => Ok(Self::NoRecipients),
            2002 => Ok(Self::RecipientsConfigInvalid),
            2003 => Ok(Self::NotificationFailed),
            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::ConfigError),
            9004 => Ok(Self::NetworkError),
            9005 => Ok(Self::TimeoutError),
            other => Err(InvalidErrorCode(other)),
        }
    }
}
