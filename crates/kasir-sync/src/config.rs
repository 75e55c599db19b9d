//! # Sync Configuration
//!
//! `sync.toml` in the platform config dir, then `KASIR_*` variables on top.
//!
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Kasir Depan"
//!
//! [store]
//! id = "owner-42"
//!
//! [sync]
//! mode = "online"            # online | offline
//! remote_url = "wss://sync.example.id/ws"
//! batch_size = 100
//! ack_timeout_secs = 30
//! retention_days = 7
//! ```
//!
//! | Variable            | Overrides           |
//! |---------------------|---------------------|
//! | `KASIR_DEVICE_ID`   | `device.id`         |
//! | `KASIR_DEVICE_NAME` | `device.name`       |
//! | `KASIR_STORE_ID`    | `store.id`          |
//! | `KASIR_SYNC_MODE`   | `sync.mode`         |
//! | `KASIR_REMOTE_URL`  | `sync.remote_url`   |
//!
//! Missing keys take their defaults, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// `Offline` never opens a socket; every record stays `LocalOnly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Online,
    Offline,
}

impl SyncMode {
    pub fn is_sync_enabled(&self) -> bool {
        *self == SyncMode::Online
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncMode::Online => "online",
            SyncMode::Offline => "offline",
        })
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" | "auto" => Ok(SyncMode::Online),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "sync mode '{}' is neither online nor offline",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: "Kasir".to_string(),
        }
    }
}

/// The tenant partition this till writes into. At startup the terminal
/// replaces `id` with the signed-in owner's store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub id: String,
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: "default-store".to_string(),
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub mode: SyncMode,
    pub remote_url: Option<String>,
    /// Outbox entries per `OutboxBatch`.
    pub batch_size: usize,
    pub connect_timeout_secs: u64,
    /// A batch with no `BatchAck` after this long is sent again.
    pub ack_timeout_secs: u64,
    /// Acknowledged outbox entries are deleted after this many days.
    pub retention_days: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub ping_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::Online,
            remote_url: None,
            batch_size: 100,
            connect_timeout_secs: 10,
            ack_timeout_secs: 30,
            retention_days: 7,
            initial_backoff_ms: 500,
            max_backoff_secs: 60,
            ping_interval_secs: 30,
        }
    }
}

impl SyncSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub device: DeviceConfig,
    pub store: StoreConfig,
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// File (if present), then environment, then validation.
    pub fn load(path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = match path.or_else(default_path) {
            Some(path) if path.exists() => Self::read(&path)?,
            Some(path) => {
                debug!(?path, "No sync.toml, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults on any error; the till must start regardless.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(%e, "Sync config unusable, falling back to defaults");
            Self::default()
        })
    }

    fn read(path: &Path) -> SyncResult<Self> {
        info!(?path, "Reading sync config");
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Writes through a temp file so a crash never leaves half a config.
    pub fn save(&self, path: Option<PathBuf>) -> SyncResult<()> {
        let path = path
            .or_else(default_path)
            .ok_or_else(|| SyncError::ConfigFile("no config directory on this platform".into()))?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, toml::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }
        if self.store.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("store id must not be empty".into()));
        }
        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if let Some(raw) = &self.sync.remote_url {
            let scheme = Url::parse(raw)?.scheme().to_string();
            if scheme != "ws" && scheme != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "{} (expected ws:// or wss://)",
                    raw
                )));
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str, apply: &mut dyn FnMut(String)| {
            if let Some(value) = lookup(key) {
                debug!(key, "Sync config override");
                apply(value);
            }
        };

        set("KASIR_DEVICE_ID", &mut |v| self.device.id = v);
        set("KASIR_DEVICE_NAME", &mut |v| self.device.name = v);
        set("KASIR_STORE_ID", &mut |v| self.store.id = v);
        set("KASIR_REMOTE_URL", &mut |v| self.sync.remote_url = Some(v));
        set("KASIR_SYNC_MODE", &mut |v| match v.parse() {
            Ok(mode) => self.sync.mode = mode,
            Err(e) => warn!(%e, "Ignoring KASIR_SYNC_MODE"),
        });
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn store_id(&self) -> &str {
        &self.store.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.sync.remote_url.as_deref()
    }
}

fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("id", "kasir", "kasir")
        .map(|dirs| dirs.config_dir().join("sync.toml"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_mode_words() {
        assert_eq!("online".parse::<SyncMode>().unwrap(), SyncMode::Online);
        assert_eq!(" Offline ".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
        assert!(!SyncMode::Offline.is_sync_enabled());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.mode(), SyncMode::Online);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.ack_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync.retention_days, 7);
        assert!(config.remote_url().is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.device.id = " ".into();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));
        config.device.id = "till-1".into();

        config.sync.remote_url = Some("http://sync.example.id".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));
        config.sync.remote_url = Some("not a url".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));
        config.sync.remote_url = Some("wss://sync.example.id/ws".into());
        assert!(config.validate().is_ok());

        config.sync.batch_size = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_environment_beats_file() {
        let mut config: SyncConfig = toml::from_str(
            r#"
            [device]
            id = "from-file"

            [store]
            id = "owner-1"

            [sync]
            mode = "online"
            batch_size = 20
            "#,
        )
        .unwrap();

        let env = HashMap::from([
            ("KASIR_DEVICE_ID", "from-env"),
            ("KASIR_SYNC_MODE", "offline"),
            ("KASIR_REMOTE_URL", "ws://127.0.0.1:9000"),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device_id(), "from-env");
        assert_eq!(config.store_id(), "owner-1");
        assert_eq!(config.mode(), SyncMode::Offline);
        assert_eq!(config.remote_url(), Some("ws://127.0.0.1:9000"));
        assert_eq!(config.sync.batch_size, 20);
    }

    #[test]
    fn test_bad_mode_override_keeps_file_value() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|key| (key == "KASIR_SYNC_MODE").then(|| "hub".to_string()));
        assert_eq!(config.mode(), SyncMode::Online);
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("kasir-sync-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.store.id = "owner-3".into();
        config.sync.mode = SyncMode::Offline;
        config.save(Some(path.clone())).unwrap();

        let back = SyncConfig::read(&path).unwrap();
        assert_eq!(back.device_id(), config.device_id());
        assert_eq!(back.store_id(), "owner-3");
        assert_eq!(back.mode(), SyncMode::Offline);

        let _ = std::fs::remove_dir_all(dir);
    }
}
