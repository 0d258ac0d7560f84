//! Configuration loaded from YAML with environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::repository::RepositoryConfig;
use crate::saga::SagaConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CHRONICLE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selector: `sqlite` or `memory`.
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Database file path, sqlite only.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "data/chronicle.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Snapshot each time a stream crosses a multiple of this many
    /// events. Zero disables snapshotting.
    pub every_n_events: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { every_n_events: 50 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SagaTimeouts {
    pub step_timeout_secs: u64,
    pub compensation_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for SagaTimeouts {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            compensation_timeout_secs: 30,
            sweep_interval_secs: 60,
            stale_after_secs: 600,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub snapshots: SnapshotConfig,
    pub cache: CacheConfig,
    pub saga: SagaTimeouts,
}

impl Config {
    /// Load from the file named by `CHRONICLE_CONFIG`, falling back to
    /// defaults when unset. Environment overrides apply last.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                info!(config.path = %path, "loading config file");
                Self::from_file(&path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(storage_type) = std::env::var("CHRONICLE_STORAGE_TYPE") {
            self.storage.storage_type = storage_type;
        }
        if let Ok(path) = std::env::var("CHRONICLE_STORAGE_PATH") {
            self.storage.path = path;
        }
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            snapshot_every: self.snapshots.every_n_events,
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            cache_sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
            snapshot_read: true,
        }
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            step_timeout: Duration::from_secs(self.saga.step_timeout_secs),
            compensation_timeout: Duration::from_secs(self.saga.compensation_timeout_secs),
            sweep_interval: Duration::from_secs(self.saga.sweep_interval_secs),
            stale_after: Duration::from_secs(self.saga.stale_after_secs),
        }
    }
}
