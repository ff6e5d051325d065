//! Configuration schema for modeltier
//!
//! Configuration is stored at `~/.config/modeltier/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory under the cache-tier root holding persisted cache state
pub const STATE_DIR: &str = "cache";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache-tier storage settings
    pub storage: StorageConfig,

    /// Residency and eviction settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache-tier storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the fast local storage tier
    pub root: PathBuf,

    /// Advisory lock file name, relative to the root
    pub lock_file: String,

    /// Prefix for staging directories created under the root
    pub staging_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/mnt/nvme"),
            lock_file: ".placement.lock".to_string(),
            staging_prefix: ".tmp_".to_string(),
        }
    }
}

/// Cache residency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum resident size in GB
    pub max_size_gb: f64,

    /// Fraction of `max_size_gb` to keep free (0.2 = 20%)
    pub target_free_fraction: f64,

    /// Entries accessed more recently than this are never evicted
    pub eviction_grace_secs: u64,

    /// Period of the eviction pass
    pub eviction_interval_secs: u64,

    /// Period of the predictive pre-fetch pass
    pub prediction_interval_secs: u64,

    /// Period of index and pattern persistence
    pub persist_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_gb: 500.0,
            target_free_fraction: 0.2,
            eviction_grace_secs: 3600,
            eviction_interval_secs: 60,
            prediction_interval_secs: 300,
            persist_interval_secs: 30,
        }
    }
}

/// Typed settings handed to the cache state manager
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root: PathBuf,
    pub max_size_gb: f64,
    pub target_free_fraction: f64,
    pub eviction_grace: Duration,
    pub eviction_interval: Duration,
    pub prediction_interval: Duration,
    pub persist_interval: Duration,
}

impl CacheSettings {
    /// Resident size the eviction pass works back down to
    pub fn target_size_gb(&self) -> f64 {
        self.max_size_gb * (1.0 - self.target_free_fraction)
    }

    /// Directory holding the persisted index, patterns, and deletion markers
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }
}

impl From<&Config> for CacheSettings {
    fn from(config: &Config) -> Self {
        Self {
            root: config.storage.root.clone(),
            max_size_gb: config.cache.max_size_gb,
            target_free_fraction: config.cache.target_free_fraction.clamp(0.0, 1.0),
            eviction_grace: Duration::from_secs(config.cache.eviction_grace_secs),
            eviction_interval: Duration::from_secs(config.cache.eviction_interval_secs.max(1)),
            prediction_interval: Duration::from_secs(config.cache.prediction_interval_secs.max(1)),
            persist_interval: Duration::from_secs(config.cache.persist_interval_secs.max(1)),
        }
    }
}

/// Typed settings handed to the placement coordinator
#[derive(Debug, Clone)]
pub struct PlacementSettings {
    pub root: PathBuf,
    pub lock_file: String,
    pub staging_prefix: String,
}

impl From<&Config> for PlacementSettings {
    fn from(config: &Config) -> Self {
        Self {
            root: config.storage.root.clone(),
            lock_file: config.storage.lock_file.clone(),
            staging_prefix: config.storage.staging_prefix.clone(),
        }
    }
}
