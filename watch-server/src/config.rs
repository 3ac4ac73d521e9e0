//! Server configuration
//!
//! All settings come from environment variables (a `.env` file is honored).
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | DATABASE_URL | — | Postgres URL; composed from DB_* parts when unset |
//! | DB_HOST / DB_PORT / DB_USER / DB_PASSWORD / DB_NAME | localhost/5432/postgres/—/storewatch | URL parts fallback |
//! | HTTP_PORT | 8080 | HTTP listen port |
//! | ALERT_THRESHOLD_MINUTES | 5 | Silence before a store is judged offline |
//! | OFFLINE_ALERT_COOLDOWN_MINUTES | 5 | Min gap between repeat offline alerts |
//! | RECOVERY_ALERT_COOLDOWN_MINUTES | 5 | Min gap between recovery alerts |
//! | STARTUP_ALERT_COOLDOWN_MINUTES | 10 | Min gap between startup alerts |
//! | HEALTH_CHECK_INTERVAL | 2 | Sweeper period, minutes |
//! | EMAIL_CONFIG_PATH | — | Recipients JSON file |
//! | FRONTEND_URL | — | Comma-separated CORS allow-list |
//! | LOG_DIR | — | Daily-rolling log file directory |

use std::path::PathBuf;

use crate::dispatcher::CooldownPolicy;
use crate::sweeper::OFFLINE_GRACE_MS;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_port: u16,
    /// Minutes of silence before the sweeper judges a store offline
    pub alert_threshold_minutes: u64,
    pub offline_cooldown_minutes: u64,
    pub recovery_cooldown_minutes: u64,
    pub startup_cooldown_minutes: u64,
    /// Sweeper period in minutes
    pub health_check_interval_minutes: u64,
    pub email_config_path: Option<PathBuf>,
    /// Comma-separated CORS origins; absent means permissive
    pub frontend_url: Option<String>,
    pub log_dir: Option<String>,
    pub environment: String,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except database credentials.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".into());
            let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".into());
            let user = std::env::var("DB_USER").unwrap_or_else(|_| "postgres".into());
            let password = std::env::var("DB_PASSWORD").unwrap_or_default();
            let name = std::env::var("DB_NAME").unwrap_or_else(|_| "storewatch".into());
            if password.is_empty() {
                format!("postgres://{user}@{host}:{port}/{name}")
            } else {
                format!("postgres://{user}:{password}@{host}:{port}/{name}")
            }
        });

        Self {
            database_url,
            http_port: env_u64("HTTP_PORT", 8080) as u16,
            alert_threshold_minutes: env_u64("ALERT_THRESHOLD_MINUTES", 5),
            offline_cooldown_minutes: env_u64("OFFLINE_ALERT_COOLDOWN_MINUTES", 5),
            recovery_cooldown_minutes: env_u64("RECOVERY_ALERT_COOLDOWN_MINUTES", 5),
            startup_cooldown_minutes: env_u64("STARTUP_ALERT_COOLDOWN_MINUTES", 10),
            health_check_interval_minutes: env_u64("HEALTH_CHECK_INTERVAL", 2),
            email_config_path: std::env::var("EMAIL_CONFIG_PATH").ok().map(PathBuf::from),
            frontend_url: std::env::var("FRONTEND_URL").ok(),
            log_dir: std::env::var("LOG_DIR").ok(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// Silence threshold in millis including the sweep grace buffer.
    pub fn offline_after_ms(&self) -> i64 {
        self.alert_threshold_minutes as i64 * 60_000 + OFFLINE_GRACE_MS
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            offline_ms: self.offline_cooldown_minutes as i64 * 60_000,
            recovery_ms: self.recovery_cooldown_minutes as i64 * 60_000,
            startup_ms: self.startup_cooldown_minutes as i64 * 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_after_includes_grace() {
        let mut config = Config::from_env();
        config.alert_threshold_minutes = 5;
        assert_eq!(config.offline_after_ms(), 5 * 60_000 + 30_000);
    }

    #[test]
    fn cooldown_policy_converts_minutes() {
        let mut config = Config::from_env();
        config.offline_cooldown_minutes = 5;
        config.startup_cooldown_minutes = 10;
        let policy = config.cooldown_policy();
        assert_eq!(policy.offline_ms, 300_000);
        assert_eq!(policy.startup_ms, 600_000);
    }
}
