//! Access and estimate commands

use crate::cli::args::{AccessArgs, EstimateArgs};
use crate::config::Config;
use crate::error::TierResult;
use crate::provider::Provider;
use console::style;

/// Execute the access command
pub async fn execute(args: AccessArgs, config: &Config) -> TierResult<()> {
    let provider: Provider = args.provider.parse()?;
    let size_gb = args
        .size_gb
        .unwrap_or_else(|| provider.estimate_size_gb(&args.model_id) as f64);

    let manager = super::open_cache(config).await?;
    let admitted = manager.is_resident(&args.model_id)
        || manager.should_cache(&args.model_id, size_gb);

    let entry = manager
        .record_access(
            &args.model_id,
            provider,
            size_gb,
            args.load_time_ms,
            args.path.as_deref(),
        )
        .await?;
    manager.persist().await?;

    let marker = if entry.access_count == 1 {
        style("+").green()
    } else {
        style("↻").cyan()
    };
    println!(
        "{} {} ({}, {:.1} GB) access #{} at {}",
        marker,
        entry.model_id,
        entry.provider,
        entry.size_gb,
        entry.access_count,
        entry.path.display()
    );
    if !admitted {
        println!(
            "  {} over target with nothing eligible for eviction",
            style("!").yellow()
        );
    }

    Ok(())
}

/// Execute the estimate command
pub async fn estimate(args: EstimateArgs, config: &Config) -> TierResult<()> {
    let manager = super::open_cache(config).await?;
    let ms = manager.load_time_estimate(&args.model_id);

    let state = if manager.is_resident(&args.model_id) {
        style("resident").green()
    } else {
        style("not resident").dim()
    };
    println!("{}: ~{:.0} ms ({})", args.model_id, ms, state);
    Ok(())
}
