//! # Ledger Configuration
//!
//! Where the store lives, how hard the ledger retries, and what gets logged.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OMBOR_STORE_BACKEND=sqlite                                         │
//! │     OMBOR_DB_PATH=/var/lib/ombor/ombor.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, or                                                  │
//! │     ~/.config/ombor/ledger.toml (Linux)                                │
//! │     ~/Library/Application Support/uz.ombor.ombor/ledger.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     sqlite store in the platform data dir, 3 conflict retries          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [store]
//! backend = "sqlite"          # memory | sqlite
//! path = "./ombor.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [ledger]
//! max_conflict_retries = 3
//! recover_on_startup = true
//! intent_retention_days = 30
//!
//! [logging]
//! filter = "info,ombor_ledger=debug"
//! ```
//!
//! ## Environment Variables
//! | Variable                      | Overrides                         |
//! |-------------------------------|-----------------------------------|
//! | `OMBOR_STORE_BACKEND`         | `store.backend`                   |
//! | `OMBOR_DB_PATH`               | `store.path`                      |
//! | `OMBOR_MAX_CONNECTIONS`       | `store.max_connections`           |
//! | `OMBOR_MAX_CONFLICT_RETRIES`  | `ledger.max_conflict_retries`     |
//! | `OMBOR_RECOVER_ON_STARTUP`    | `ledger.recover_on_startup`       |
//! | `OMBOR_LOG`                   | `logging.filter`                  |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ombor_db::DbConfig;

use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Store Backend
// =============================================================================

/// Which Ledger Store implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store. Nothing survives a restart.
    Memory,

    /// SQLite file with atomic write batches.
    #[default]
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "sqlite" | "file" => Ok(StoreBackend::Sqlite),
            other => Err(LedgerError::InvalidConfig(format!(
                "Unknown store backend: '{}'. Valid options: memory, sqlite",
                other
            ))),
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Ledger Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            backend: StoreBackend::default(),
            path: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl StoreSettings {
    /// The SQLite file to open: the configured path or the platform default.
    pub fn database_path(&self) -> LedgerResult<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        directories::ProjectDirs::from("uz", "ombor", "ombor")
            .map(|dirs| dirs.data_dir().join("ombor.db"))
            .ok_or_else(|| {
                LedgerError::InvalidConfig("Could not determine app data directory".to_string())
            })
    }

    /// Builds the SQLite connection config.
    pub fn to_db_config(&self) -> LedgerResult<DbConfig> {
        let path = self.database_path()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(DbConfig::new(path)
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs)))
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

/// Write-path behaviour of the ledger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// How many times a transaction is re-planned after a lost-update
    /// conflict on a debt or stock figure.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Replay pending intents when the ledger opens.
    #[serde(default = "default_true")]
    pub recover_on_startup: bool,

    /// Applied intents older than this may be pruned.
    #[serde(default = "default_retention_days")]
    pub intent_retention_days: u32,
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            max_conflict_retries: default_max_conflict_retries(),
            recover_on_startup: true,
            intent_retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Log Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive. `RUST_LOG` wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            filter: default_filter(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub logging: LogSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`ledger.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> LedgerResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path);
        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else if config_path.is_some() {
                return Err(LedgerError::InvalidConfig(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml(contents: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.store.max_connections == 0 {
            return Err(LedgerError::InvalidConfig(
                "store.max_connections must be greater than 0".into(),
            ));
        }

        if self.store.connect_timeout_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "store.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(LedgerError::InvalidConfig("logging.filter must not be empty".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `OMBOR_*` overrides from any variable source.
    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = var("OMBOR_STORE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => {
                    debug!(backend = %backend, "Overriding store backend from environment");
                    self.store.backend = parsed;
                }
                Err(_) => warn!(backend = %backend, "Unknown store backend in environment"),
            }
        }

        if let Some(path) = var("OMBOR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.path = Some(PathBuf::from(path));
        }

        if let Some(max) = var("OMBOR_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.store.max_connections = n;
            }
        }

        if let Some(retries) = var("OMBOR_MAX_CONFLICT_RETRIES") {
            if let Ok(n) = retries.parse::<u32>() {
                self.ledger.max_conflict_retries = n;
            }
        }

        if let Some(recover) = var("OMBOR_RECOVER_ON_STARTUP") {
            match recover.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.ledger.recover_on_startup = true,
                "0" | "false" | "no" => self.ledger.recover_on_startup = false,
                _ => warn!(value = %recover, "Unrecognised OMBOR_RECOVER_ON_STARTUP"),
            }
        }

        if let Some(filter) = var("OMBOR_LOG") {
            self.logging.filter = filter;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("uz", "ombor", "ombor")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.ledger.max_conflict_retries, 3);
        assert!(config.ledger.recover_on_startup);
        assert_eq!(config.ledger.intent_retention_days, 30);
        assert_eq!(config.logging.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LedgerConfig::from_toml(
            r#"
            [store]
            backend = "memory"

            [ledger]
            max_conflict_retries = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.ledger.max_conflict_retries, 7);
        assert!(config.ledger.recover_on_startup);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();
        config.store.max_connections = 0;
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfig(_))));

        assert!(LedgerConfig::from_toml("[logging]\nfilter = \"  \"").is_err());
        assert!(LedgerConfig::from_toml("[store]\nbackend = \"redis\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OMBOR_STORE_BACKEND", "memory"),
            ("OMBOR_DB_PATH", "/tmp/ombor-test.db"),
            ("OMBOR_MAX_CONFLICT_RETRIES", "9"),
            ("OMBOR_RECOVER_ON_STARTUP", "no"),
            ("OMBOR_MAX_CONNECTIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = LedgerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/ombor-test.db")));
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.ledger.max_conflict_retries, 9);
        assert!(!config.ledger.recover_on_startup);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = LedgerConfig::load(Some(Path::new("/definitely/not/here/ledger.toml")));
        assert!(matches!(result, Err(LedgerError::InvalidConfig(_))));
    }

    #[test]
    fn test_db_config_from_explicit_path() {
        let settings = StoreSettings {
            path: Some(PathBuf::from("ombor-test.db")),
            max_connections: 2,
            ..StoreSettings::default()
        };
        let db = settings.to_db_config().unwrap();
        assert_eq!(db.database_path, PathBuf::from("ombor-test.db"));
        assert_eq!(db.max_connections, 2);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&LedgerConfig::default()).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[ledger]"));
        assert!(toml_str.contains("[logging]"));
    }
}
