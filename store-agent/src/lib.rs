//! store-agent library
//!
//! The agent is embeddable: the detection application links this crate,
//! feeds counters and camera health through [`app_status::AppStatus`], and
//! runs the shipper alongside its own work. The `store-agent` binary is a
//! thin standalone wrapper over the same pieces.

pub mod app_status;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod shipper;
pub mod speedtest;

pub use app_status::AppStatus;
pub use buffer::HeartbeatBuffer;
pub use collector::TelemetryCollector;
pub use config::AgentConfig;
pub use shipper::HeartbeatShipper;
pub use speedtest::SpeedCache;
