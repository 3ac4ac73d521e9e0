//! Shared types for the store monitoring platform.
//!
//! Wire models (heartbeats, acks), the alert taxonomy, the unified error
//! system and small time utilities used by both `watch-server` and
//! `store-agent`.

pub mod alert;
pub mod error;
pub mod heartbeat;
pub mod util;

pub use error::{AppError, AppResult, ErrorCode};
