//! Agent configuration
//!
//! All settings come from environment variables (a `.env` file is honored):
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `STORE_ID` | yes | — |
//! | `MONITORING_SERVER_URL` | yes | — |
//! | `STORE_NAME` | no | same as STORE_ID |
//! | `HEARTBEAT_INTERVAL` | no | 60000 (ms) |
//! | `BUFFER_DB_PATH` | no | ./heartbeat_buffer.db |
//! | `APP_VERSION` | no | crate version |
//! | `TIMEZONE` | no | UTC |

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub store_id: String,
    pub store_name: String,
    /// Base URL of the watch-server, without trailing slash
    pub server_url: String,
    pub heartbeat_interval: Duration,
    pub buffer_db_path: String,
    pub app_version: String,
    pub timezone: String,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Panics with a clear message when the required identity or server URL
    /// is missing — the agent cannot run without either.
    pub fn from_env() -> Self {
        let store_id = std::env::var("STORE_ID").expect("STORE_ID must be set");
        let server_url = std::env::var("MONITORING_SERVER_URL")
            .expect("MONITORING_SERVER_URL must be set")
            .trim_end_matches('/')
            .to_string();

        let interval_ms = std::env::var("HEARTBEAT_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000u64);

        Self {
            store_name: std::env::var("STORE_NAME").unwrap_or_else(|_| store_id.clone()),
            store_id,
            server_url,
            heartbeat_interval: Duration::from_millis(interval_ms.max(1_000)),
            buffer_db_path: std::env::var("BUFFER_DB_PATH")
                .unwrap_or_else(|_| "./heartbeat_buffer.db".into()),
            app_version: std::env::var("APP_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").into()),
            timezone: std::env::var("TIMEZONE").unwrap_or_else(|_| "UTC".into()),
        }
    }

    pub fn live_endpoint(&self) -> String {
        format!("{}/heartbeat", self.server_url)
    }

    pub fn buffered_endpoint(&self) -> String {
        format!("{}/heartbeat/buffered", self.server_url)
    }
}
