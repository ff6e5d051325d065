//! modeltier - model artifact cache tier
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use modeltier::cli::{commands, Cli, Commands};
use modeltier::config::{Config, ConfigManager};
use modeltier::error::TierResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> TierResult<()> {
    let cli = Cli::parse();

    // Identifier checks need neither config nor logging
    match cli.command {
        Commands::Validate(args) => return commands::validate(args).await,
        Commands::Sanitize(args) => return commands::sanitize(args).await,
        _ => {}
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    init_logging(cli.verbose, &config);
    debug!("Using configuration {}", config_manager.path().display());

    match cli.command {
        Commands::Validate(_) | Commands::Sanitize(_) => unreachable!("handled above"),
        Commands::Stats(args) => commands::stats(args, &config).await,
        Commands::Access(args) => commands::access(args, &config).await,
        Commands::Estimate(args) => commands::estimate(args, &config).await,
        Commands::Evict => commands::evict(&config).await,
        Commands::Clear(args) => commands::clear(args, &config).await,
        Commands::Reclaim(args) => commands::reclaim(args, &config).await,
        Commands::Clean(args) => commands::clean(args, &config).await,
        Commands::Watch => commands::watch(&config).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("modeltier=warn"),
        1 => EnvFilter::new("modeltier=info"),
        _ => EnvFilter::new("modeltier=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
