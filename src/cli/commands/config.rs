//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{TierError, TierResult};
use console::style;
use std::path::PathBuf;

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "storage.root",
    "storage.lock_file",
    "storage.staging_prefix",
    "cache.max_size_gb",
    "cache.target_free_fraction",
    "cache.eviction_grace_secs",
    "cache.eviction_interval_secs",
    "cache.prediction_interval_secs",
    "cache.persist_interval_secs",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> TierResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> TierResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> TierResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("!").yellow(),
            path.display()
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

/// Edit the file on disk, not the effective config with CLI overrides
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> TierResult<()> {
    let mut config = manager.load().await?;
    apply(&mut config, key, value)?;

    manager.save(&config).await?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

/// Set one dot-separated key on `config`
fn apply(config: &mut Config, key: &str, value: &str) -> TierResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => return Err(TierError::User("log_format must be text or json".to_string())),
        },

        ["storage", "root"] => config.storage.root = PathBuf::from(value),
        ["storage", "lock_file"] => config.storage.lock_file = value.to_string(),
        ["storage", "staging_prefix"] => config.storage.staging_prefix = value.to_string(),

        ["cache", "max_size_gb"] => config.cache.max_size_gb = parse_f64(value)?,
        ["cache", "target_free_fraction"] => config.cache.target_free_fraction = parse_f64(value)?,
        ["cache", "eviction_grace_secs"] => config.cache.eviction_grace_secs = parse_u64(value)?,
        ["cache", "eviction_interval_secs"] => {
            config.cache.eviction_interval_secs = parse_u64(value)?
        }
        ["cache", "prediction_interval_secs"] => {
            config.cache.prediction_interval_secs = parse_u64(value)?
        }
        ["cache", "persist_interval_secs"] => {
            config.cache.persist_interval_secs = parse_u64(value)?
        }

        _ => {
            return Err(TierError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    ConfigManager::check(config).map_err(TierError::User)
}

fn parse_f64(value: &str) -> TierResult<f64> {
    value
        .parse()
        .map_err(|_| TierError::User(format!("Invalid number: {}", value)))
}

fn parse_u64(value: &str) -> TierResult<u64> {
    value
        .parse()
        .map_err(|_| TierError::User(format!("Invalid whole number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "cache.max_size_gb", "64").unwrap();
        apply(&mut config, "storage.root", "/srv/models").unwrap();
        apply(&mut config, "general.log_format", "json").unwrap();

        assert_eq!(config.cache.max_size_gb, 64.0);
        assert_eq!(config.storage.root, PathBuf::from("/srv/models"));
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn apply_rejects_unknown_and_invalid() {
        let mut config = Config::default();
        assert!(apply(&mut config, "vm.name", "x").is_err());
        assert!(apply(&mut config, "cache.max_size_gb", "lots").is_err());
        assert!(apply(&mut config, "cache.target_free_fraction", "1.5").is_err());
        assert!(apply(&mut config, "storage.lock_file", "../x.lock").is_err());
    }
}
