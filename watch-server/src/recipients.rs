//! Alert recipient configuration
//!
//! A JSON file maps `store_id -> [email, ...]`; the `"default"` entry is the
//! fallback for stores with no explicit list. The map is held behind a lock
//! so the admin reload endpoint can swap it without restarting the server.
//! A failed reload keeps the previous map intact.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use shared::error::{AppError, AppResult, ErrorCode};

/// Fallback key applied to stores with no explicit entry.
pub const DEFAULT_KEY: &str = "default";

type RecipientMap = HashMap<String, Vec<String>>;

pub struct RecipientsConfig {
    path: Option<PathBuf>,
    map: RwLock<RecipientMap>,
}

impl RecipientsConfig {
    /// Load the recipients file. A missing path means notifications are
    /// disabled; a broken file starts the server with an empty map but keeps
    /// the path so `reload` can recover once the file is fixed.
    pub fn load(path: Option<PathBuf>) -> Self {
        let map = match &path {
            Some(p) => match Self::read_file(p) {
                Ok(map) => {
                    tracing::info!(entries = map.len(), path = %p.display(), "Recipients config loaded");
                    map
                }
                Err(e) => {
                    tracing::error!("Recipients config unusable, starting empty: {e}");
                    HashMap::new()
                }
            },
            None => {
                tracing::warn!("EMAIL_CONFIG_PATH not set, alert notifications disabled");
                HashMap::new()
            }
        };

        Self {
            path,
            map: RwLock::new(map),
        }
    }

    /// Build directly from a map (tests, embedded defaults).
    pub fn from_map(map: RecipientMap) -> Self {
        Self {
            path: None,
            map: RwLock::new(map),
        }
    }

    /// Re-read the file from disk. Returns the number of entries loaded; on
    /// failure the previous map is kept.
    pub fn reload(&self) -> AppResult<usize> {
        let Some(path) = &self.path else {
            return Err(AppError::with_message(
                ErrorCode::RecipientsConfigInvalid,
                "No recipients file configured",
            ));
        };

        let fresh = Self::read_file(path)?;
        let count = fresh.len();
        *self.map.write() = fresh;
        tracing::info!(entries = count, path = %path.display(), "Recipients config reloaded");
        Ok(count)
    }

    /// Recipients for one store: its own entry, else the default entry,
    /// else empty.
    pub fn lookup(&self, store_id: &str) -> Vec<String> {
        let map = self.map.read();
        map.get(store_id)
            .or_else(|| map.get(DEFAULT_KEY))
            .cloned()
            .unwrap_or_default()
    }

    /// Full copy of the current map, for the admin snapshot endpoint.
    pub fn snapshot(&self) -> RecipientMap {
        self.map.read().clone()
    }

    fn read_file(path: &PathBuf) -> AppResult<RecipientMap> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::with_message(
                ErrorCode::RecipientsConfigInvalid,
                format!("Cannot read recipients file {}: {e}", path.display()),
            )
        })?;

        let map: RecipientMap = serde_json::from_str(&content).map_err(|e| {
            AppError::with_message(
                ErrorCode::RecipientsConfigInvalid,
                format!("Recipients file {} is not valid JSON: {e}", path.display()),
            )
        })?;

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(entries: &[(&str, &[&str])]) -> RecipientsConfig {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        RecipientsConfig::from_map(map)
    }

    #[test]
    fn explicit_entry_wins_over_default() {
        let config = config_with(&[
            ("st-1", &["ops-1@example.com"]),
            (DEFAULT_KEY, &["fleet@example.com"]),
        ]);
        assert_eq!(config.lookup("st-1"), vec!["ops-1@example.com"]);
    }

    #[test]
    fn missing_entry_falls_back_to_default() {
        let config = config_with(&[(DEFAULT_KEY, &["fleet@example.com"])]);
        assert_eq!(config.lookup("st-404"), vec!["fleet@example.com"]);
    }

    #[test]
    fn no_entry_and_no_default_is_empty() {
        let config = config_with(&[("st-1", &["ops-1@example.com"])]);
        assert!(config.lookup("st-404").is_empty());
    }

    #[test]
    fn reload_without_path_errors() {
        let config = config_with(&[]);
        assert!(config.reload().is_err());
    }

    #[test]
    fn load_parses_file_and_reload_picks_up_changes() {
        let dir = std::env::temp_dir().join(format!("recipients-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("recipients.json");

        std::fs::write(&path, r#"{"st-1": ["a@example.com"]}"#).unwrap();
        let config = RecipientsConfig::load(Some(path.clone()));
        assert_eq!(config.lookup("st-1"), vec!["a@example.com"]);

        std::fs::write(
            &path,
            r#"{"st-1": ["a@example.com"], "default": ["b@example.com"]}"#,
        )
        .unwrap();
        assert_eq!(config.reload().unwrap(), 2);
        assert_eq!(config.lookup("other"), vec!["b@example.com"]);

        // A broken file keeps the previous map.
        std::fs::write(&path, "not json").unwrap();
        assert!(config.reload().is_err());
        assert_eq!(config.lookup("other"), vec!["b@example.com"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
