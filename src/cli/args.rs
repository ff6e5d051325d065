//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// modeltier - model artifact cache tier
///
/// Validates model identifiers, inspects and maintains the LRU cache index
/// on a fast local storage tier.
#[derive(Parser, Debug)]
#[command(name = "modeltier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MODELTIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache-tier root (overrides storage.root)
    #[arg(long, global = true, env = "MODELTIER_ROOT")]
    pub root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a model identifier against a provider's grammar
    Validate(ValidateArgs),

    /// Print the filesystem-safe form of a name
    Sanitize(SanitizeArgs),

    /// Show cache statistics
    Stats(StatsArgs),

    /// Record an access to a model
    Access(AccessArgs),

    /// Estimate how long a model takes to become usable
    Estimate(EstimateArgs),

    /// Run one eviction pass
    Evict,

    /// Clear cached entries
    Clear(ClearArgs),

    /// Remove artifacts marked for deletion
    Reclaim(ReclaimArgs),

    /// Remove leftover staging directories and replaced-artifact backups
    Clean(CleanArgs),

    /// Run eviction, prediction and persistence loops until interrupted
    Watch,

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Provider grammar (huggingface, ollama)
    pub provider: String,

    /// Model identifier
    pub model_id: String,
}

/// Arguments for the sanitize command
#[derive(Parser, Debug)]
pub struct SanitizeArgs {
    /// Name to sanitize
    pub name: String,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the access command
#[derive(Parser, Debug)]
pub struct AccessArgs {
    /// Provider (huggingface, ollama, vllm)
    pub provider: String,

    /// Model identifier
    pub model_id: String,

    /// Artifact size in GB (estimated from the id if omitted)
    #[arg(long)]
    pub size_gb: Option<f64>,

    /// Observed load time in milliseconds
    #[arg(long, default_value = "0")]
    pub load_time_ms: f64,

    /// Artifact path inside the cache-tier root
    #[arg(long)]
    pub path: Option<PathBuf>,
}

/// Arguments for the estimate command
#[derive(Parser, Debug)]
pub struct EstimateArgs {
    /// Model identifier
    pub model_id: String,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Drop every entry and all usage patterns
    #[arg(long)]
    pub force: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the reclaim command
#[derive(Parser, Debug)]
pub struct ReclaimArgs {
    /// List what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// List what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.max_size_gb)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}
