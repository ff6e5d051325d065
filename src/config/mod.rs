//! Configuration management for modeltier

pub mod schema;

pub use schema::{CacheSettings, Config, PlacementSettings, STATE_DIR};

use crate::error::{TierError, TierResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modeltier")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if not present
    pub async fn load(&self) -> TierResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> TierResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TierError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| TierError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::check(&config).map_err(|reason| TierError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(config)
    }

    /// Reject values no cache could run with
    pub fn check(config: &Config) -> Result<(), String> {
        if !(config.cache.max_size_gb > 0.0) {
            return Err("cache.max_size_gb must be positive".to_string());
        }
        if !(0.0..1.0).contains(&config.cache.target_free_fraction) {
            return Err("cache.target_free_fraction must be in [0, 1)".to_string());
        }
        if config.storage.staging_prefix.is_empty() {
            return Err("storage.staging_prefix cannot be empty".to_string());
        }
        let lock_file = &config.storage.lock_file;
        if lock_file.is_empty()
            || lock_file.contains(['/', '\\'])
            || !crate::validate::validate_path_traversal(lock_file)
        {
            return Err("storage.lock_file must be a plain file name".to_string());
        }
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> TierResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                TierError::io(format!("creating config directory {}", parent.display()), e)
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            TierError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
