//! # Configuration State
//!
//! Till settings read once at startup.
//!
//! ## Environment Variables
//! | Variable                   | Default                 |
//! |----------------------------|-------------------------|
//! | `KASIR_DB_PATH`            | platform data dir       |
//! | `KASIR_PRINCIPAL_ID`       | `owner-local`           |
//! | `KASIR_PRINCIPAL_EMAIL`    | `owner@kasir.local`     |
//! | `KASIR_ROLE`               | `owner`                 |
//! | `KASIR_OWNER_ID`           | unset                   |
//! | `KASIR_ACCESS`             | unset (`cashier,table`) |
//! | `KASIR_UTC_OFFSET_MINUTES` | `420` (WIB)             |
//! | `KASIR_STORE_NAME`         | `Warung Kasir`          |
//!
//! The principal comes from the external auth provider; the till trusts it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Duration, FixedOffset};
use directories::ProjectDirs;
use serde::Serialize;
use thiserror::Error;

use kasir_core::clock::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
use kasir_core::{Feature, Principal, Role, Store};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("Could not determine app data directory")]
    NoDataDir,

    #[error("Could not create data directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigState {
    /// Explicit database file; `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,

    /// The authenticated principal.
    pub principal: Principal,

    /// Store-local clock, minutes east of UTC.
    pub utc_offset_minutes: i32,

    /// Shown when the store row has not been fetched yet.
    pub store_name: String,

    /// How long an impersonation token lives.
    pub impersonation_ttl_minutes: i64,
}

impl Default for ConfigState {
    /// A single owner running their own till.
    fn default() -> Self {
        ConfigState {
            db_path: None,
            principal: Principal {
                id: "owner-local".to_string(),
                email: "owner@kasir.local".to_string(),
                role: Role::Owner,
                owner_id: None,
                access: BTreeMap::new(),
            },
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            store_name: "Warung Kasir".to_string(),
            impersonation_ttl_minutes: 60,
        }
    }
}

impl ConfigState {
    /// Creates a ConfigState from environment variables and defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = ConfigState::default();

        if let Some(path) = lookup("KASIR_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(id) = lookup("KASIR_PRINCIPAL_ID") {
            config.principal.id = id;
        }
        if let Some(email) = lookup("KASIR_PRINCIPAL_EMAIL") {
            config.principal.email = email;
        }
        if let Some(role) = lookup("KASIR_ROLE") {
            config.principal.role = role.parse().map_err(|e| ConfigError::InvalidValue {
                name: "KASIR_ROLE",
                reason: format!("{}", e),
            })?;
        }
        if let Some(owner) = lookup("KASIR_OWNER_ID").filter(|o| !o.trim().is_empty()) {
            config.principal.owner_id = Some(owner);
        }

        if config.principal.role == Role::Employee {
            let access = lookup("KASIR_ACCESS").unwrap_or_else(|| "cashier,table".to_string());
            config.principal.access = parse_access(&access)?;
        }

        if let Some(minutes) = lookup("KASIR_UTC_OFFSET_MINUTES") {
            config.utc_offset_minutes =
                minutes
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "KASIR_UTC_OFFSET_MINUTES",
                        reason: format!("'{}' is not a number of minutes", minutes),
                    })?;
        }
        if let Some(name) = lookup("KASIR_STORE_NAME").filter(|n| !n.trim().is_empty()) {
            config.store_name = name;
        }

        Ok(config)
    }

    /// The store-local offset used for "today" and "this month".
    pub fn offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }

    pub fn impersonation_ttl(&self) -> Duration {
        Duration::minutes(self.impersonation_ttl_minutes)
    }

    /// Resolves the database file, creating its directory.
    ///
    /// ## Platform-Specific Paths
    /// - **macOS**: `~/Library/Application Support/com.kasir.pos/kasir.db`
    /// - **Windows**: `%APPDATA%\kasir\pos\data\kasir.db`
    /// - **Linux**: `~/.local/share/pos/kasir.db`
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("com", "kasir", "pos").ok_or(ConfigError::NoDataDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("kasir.db"))
    }

    /// The store row used until caps arrive from the tenant directory:
    /// active and unlimited.
    pub fn fallback_store(&self, store_id: &str) -> Store {
        Store {
            id: store_id.to_string(),
            name: self.store_name.clone(),
            max_transactions: 0,
            max_menus: 0,
            suspended: false,
            expires_at: None,
        }
    }
}

/// Parses `cashier,table,report` into an access map.
fn parse_access(list: &str) -> Result<BTreeMap<Feature, bool>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Feature>()
                .map(|f| (f, true))
                .map_err(|e| ConfigError::InvalidValue {
                    name: "KASIR_ACCESS",
                    reason: e.to_string(),
                })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigState::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.principal.role, Role::Owner);
        assert_eq!(config.utc_offset_minutes, 420);
        assert_eq!(config.offset().local_minus_utc(), 7 * 3600);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_employee_from_env() {
        let config = ConfigState::from_lookup(lookup(&[
            ("KASIR_PRINCIPAL_ID", "emp-7"),
            ("KASIR_ROLE", "kasir"),
            ("KASIR_OWNER_ID", "owner-1"),
            ("KASIR_ACCESS", "cashier, report"),
            ("KASIR_UTC_OFFSET_MINUTES", "480"),
            ("KASIR_DB_PATH", "/tmp/kasir-test.db"),
        ]))
        .unwrap();

        assert_eq!(config.principal.role, Role::Employee);
        assert_eq!(config.principal.owner_id.as_deref(), Some("owner-1"));
        assert!(config.principal.can_access(Feature::Cashier));
        assert!(config.principal.can_access(Feature::Report));
        assert!(!config.principal.can_access(Feature::Settings));
        assert_eq!(config.utc_offset_minutes, 480);
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/kasir-test.db")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ConfigState::from_lookup(lookup(&[("KASIR_ROLE", "manager")])).is_err());
        assert!(
            ConfigState::from_lookup(lookup(&[("KASIR_UTC_OFFSET_MINUTES", "WIB")])).is_err()
        );
        assert!(ConfigState::from_lookup(lookup(&[
            ("KASIR_ROLE", "employee"),
            ("KASIR_ACCESS", "cashier,teleport"),
        ]))
        .is_err());
    }

    #[test]
    fn test_fallback_store_is_unlimited() {
        let store = ConfigState::default().fallback_store("owner-1");
        assert_eq!(store.max_transactions, 0);
        assert_eq!(store.max_menus, 0);
        assert!(!store.suspended);
    }
}
