//! Reclaim command - remove evicted artifacts from disk

use crate::cli::args::ReclaimArgs;
use crate::config::Config;
use crate::error::TierResult;
use console::style;

/// Execute the reclaim command
pub async fn execute(args: ReclaimArgs, config: &Config) -> TierResult<()> {
    let manager = super::open_cache(config).await?;
    let report = manager.reclaim(args.dry_run).await?;

    if report.reclaimed.is_empty() && report.skipped.is_empty() {
        println!("No artifacts marked for deletion.");
        return Ok(());
    }

    for model_id in &report.reclaimed {
        println!("  {} {}", style("•").red(), model_id);
    }
    for (model_id, reason) in &report.skipped {
        println!("  {} {} ({})", style("~").yellow(), model_id, reason);
    }

    if report.dry_run {
        println!();
        println!(
            "Dry run - {} artifact(s), {:.1} GB would be removed.",
            report.reclaimed.len(),
            report.freed_gb
        );
    } else {
        println!(
            "{} reclaimed {} artifact(s), freed {:.1} GB",
            style("✓").green(),
            report.reclaimed.len(),
            report.freed_gb
        );
    }

    Ok(())
}
