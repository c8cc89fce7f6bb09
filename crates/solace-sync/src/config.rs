//! # Sync Configuration
//!
//! Configuration management for the sync engine and the `solace-sync` binary.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SOLACE_REMOTE_URL=https://xyz.supabase.co                          │
//! │     SOLACE_DEVICE_ID=abc-123                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/solace/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/app.solace.solace/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     2s debounce, 60s flush, auto-generated device_id                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Phone"
//!
//! [remote]
//! url = "https://xyz.supabase.co"
//! api_key = "public-anon-key"
//! table = "user_data"
//!
//! [sync]
//! enabled = true
//! debounce_ms = 2000
//! flush_interval_secs = 60
//!
//! [storage]
//! database_path = "/var/lib/solace/solace.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use solace_core::SyncSchedule;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable device name, used in logs only.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Solace Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Configuration
// =============================================================================

/// Where the cloud copy lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project URL (`https://<project>.supabase.co`). Sync is inert without it.
    #[serde(default)]
    pub url: Option<String>,

    /// Public API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Table holding one row per user.
    #[serde(default = "default_table")]
    pub table: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_table() -> String {
    "user_data".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: None,
            api_key: None,
            table: default_table(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Master switch.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after the last local change before pushing (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Forced push interval (seconds).
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// First retry delay after a failure (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// How long the final push on exit may take (seconds).
    #[serde(default = "default_exit_flush_timeout")]
    pub exit_flush_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_debounce() -> u64 {
    2000
}
fn default_flush_interval() -> u64 {
    60
}
fn default_initial_backoff() -> u64 {
    2000
}
fn default_max_backoff() -> u64 {
    60
}
fn default_exit_flush_timeout() -> u64 {
    5
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            enabled: true,
            debounce_ms: default_debounce(),
            flush_interval_secs: default_flush_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            exit_flush_timeout_secs: default_exit_flush_timeout(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file. Defaults to `solace.db` in the platform data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    ///
    /// A device id generated here is written back to the config file so the
    /// device keeps its identity across runs. Failing to write it is logged
    /// and not fatal.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            let has_device_id = if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                let raw: toml::Table = contents.parse()?;
                config = toml::from_str(&contents)?;
                raw.get("device").and_then(|device| device.get("id")).is_some()
            } else {
                debug!(?path, "Config file not found, using defaults");
                false
            };

            if !has_device_id {
                match config.save(Some(path.clone())) {
                    Ok(()) => info!(device_id = %config.device.id, "Generated device id saved"),
                    Err(e) => warn!(?path, error = %e, "Could not save generated device id"),
                }
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device id must not be empty".into()));
        }

        if let Some(ref url) = self.remote.url {
            let parsed = url::Url::parse(url.trim())?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    url
                )));
            }
        }

        if self.remote.table.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote table must not be empty".into()));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.debounce_ms == 0 || self.sync.flush_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "debounce_ms and flush_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.initial_backoff() > self.max_backoff() {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("SOLACE_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("SOLACE_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(url) = std::env::var("SOLACE_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Ok(key) = std::env::var("SOLACE_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Ok(table) = std::env::var("SOLACE_REMOTE_TABLE") {
            self.remote.table = table;
        }

        if let Ok(enabled) = std::env::var("SOLACE_SYNC_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.enabled = true,
                "0" | "false" | "no" | "off" => self.sync.enabled = false,
                _ => warn!(value = %enabled, "Unknown SOLACE_SYNC_ENABLED value in environment"),
            }
        }

        if let Ok(debounce) = std::env::var("SOLACE_DEBOUNCE_MS") {
            if let Ok(ms) = debounce.parse::<u64>() {
                debug!(debounce_ms = ms, "Overriding debounce from environment");
                self.sync.debounce_ms = ms;
            }
        }

        if let Ok(path) = std::env::var("SOLACE_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("app", "solace", "solace")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns true if sync is enabled and a remote is configured.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.enabled && self.remote.url.is_some()
    }

    /// Returns the remote URL if configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url.as_deref()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.sync.flush_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sync.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn exit_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.exit_flush_timeout_secs)
    }

    /// Timing policy for the engine.
    pub fn schedule(&self) -> SyncSchedule {
        SyncSchedule {
            debounce: self.debounce(),
            flush_interval: self.flush_interval(),
            backoff_floor: self.initial_backoff(),
            backoff_ceiling: self.max_backoff(),
        }
    }

    /// Resolved SQLite file location.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("app", "solace", "solace")
                .map(|dirs| dirs.data_dir().join("solace.db"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert!(config.sync.enabled);
        assert_eq!(config.remote.table, "user_data");
        assert_eq!(config.schedule(), SyncSchedule::default());
        assert!(!config.is_sync_enabled()); // No remote yet
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.device.id = String::new();
        assert!(config.validate().is_err());

        config.device.id = "test".to_string();
        config.remote.url = Some("ftp://invalid".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.url = Some("https://demo.supabase.co".to_string());
        assert!(config.validate().is_ok());

        config.sync.initial_backoff_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_request_timeout_is_rejected() {
        let mut config = SyncConfig::default();
        config.remote.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        config.remote.request_timeout_secs = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            url = "https://demo.supabase.co"

            [sync]
            debounce_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.remote.request_timeout_secs, 15);
        assert!(!config.device.id.is_empty());
        assert!(config.is_sync_enabled());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[remote]"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("solace-config-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.device.name = "Laptop".into();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.device.name, "Laptop");

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_generated_device_id_survives_reload() {
        let dir = std::env::temp_dir().join(format!("solace-config-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let first = SyncConfig::load(Some(path.clone())).unwrap();
        assert!(path.exists());
        let second = SyncConfig::load(Some(path.clone())).unwrap();
        assert_eq!(first.device.id, second.device.id);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_device_id_is_added_to_existing_file() {
        let dir = std::env::temp_dir().join(format!("solace-config-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[sync]\ndebounce_ms = 500\n").unwrap();

        let first = SyncConfig::load(Some(path.clone())).unwrap();
        assert_eq!(first.debounce(), Duration::from_millis(500));

        let contents = std::fs::read_to_string(&path).unwrap();
        let saved: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(saved.device.id, first.device.id);
        assert_eq!(saved.sync.debounce_ms, 500);

        std::fs::remove_dir_all(dir).ok();
    }
}
