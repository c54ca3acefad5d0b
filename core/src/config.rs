//! Settings management.
//!
//! Stores settings in JSON format at `~/.kubeforward/config.json`.
//! Only how to reach the cluster and timing knobs live here; forward rows are
//! never persisted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Name of the per-user settings directory under `$HOME`.
pub const CONFIG_DIR_NAME: &str = ".kubeforward";

/// Settings stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Explicit kubectl binary. Searched for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl_path: Option<PathBuf>,

    /// kubeconfig file. kubectl's own lookup (`KUBECONFIG`, `~/.kube/config`) when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Address the local side of each forward listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Timeout for one discovery call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for confirming a forward target exists, in seconds.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Timeout for a tunnel to start listening, in seconds.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Queued notifications above which a back-pressure warning is logged.
    #[serde(default = "default_event_high_water")]
    pub event_high_water: usize,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_bind_address() -> String {
    crate::kubernetes::tunnel::DEFAULT_BIND_ADDRESS.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_resolve_timeout() -> u64 {
    10
}

fn default_dial_timeout() -> u64 {
    15
}

fn default_event_high_water() -> usize {
    256
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kubectl_path: None,
            kubeconfig: None,
            bind_address: default_bind_address(),
            request_timeout_secs: default_request_timeout(),
            resolve_timeout_secs: default_resolve_timeout(),
            dial_timeout_secs: default_dial_timeout(),
            event_high_water: default_event_high_water(),
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs.max(1))
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs.max(1))
    }
}

/// Settings store handling `~/.kubeforward/config.json`.
pub struct SettingsStore {
    /// Path to the settings file.
    config_path: PathBuf,
}

impl SettingsStore {
    /// Create a new settings store with the default path.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: config_dir()?.join("config.json"),
        })
    }

    /// Create a settings store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load settings from disk.
    ///
    /// Returns default settings if the file doesn't exist.
    pub async fn load(&self) -> Result<Settings> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save settings to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }
}

/// `~/.kubeforward`, for settings and the TUI log file.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (SettingsStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (SettingsStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_address, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        let settings = Settings {
            kubeconfig: Some(PathBuf::from("/home/dev/.kube/staging")),
            dial_timeout_secs: 30,
            ..Settings::default()
        };
        store.save(&settings).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.dial_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        std::fs::create_dir_all(store.config_path().parent().unwrap()).unwrap();
        std::fs::write(store.config_path(), r#"{"requestTimeoutSecs": 3}"#).unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.request_timeout_secs, 3);
        assert_eq!(loaded.resolve_timeout_secs, 10);
        assert_eq!(loaded.log_filter, "info");
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let (store, _dir) = test_store();
        std::fs::create_dir_all(store.config_path().parent().unwrap()).unwrap();
        std::fs::write(store.config_path(), "not json").unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let settings = Settings {
            resolve_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.resolve_timeout(), Duration::from_secs(1));
    }
}
