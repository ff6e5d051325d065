//! Evict command - run a single eviction pass

use crate::config::Config;
use crate::error::TierResult;
use console::style;

/// Execute the evict command
pub async fn execute(config: &Config) -> TierResult<()> {
    let manager = super::open_cache(config).await?;
    let eviction = manager.evict_pass().await?;
    manager.persist().await?;

    if eviction.evicted.is_empty() {
        if eviction.resident_gb > eviction.target_gb {
            println!(
                "{} {:.1} GB resident exceeds target {:.1} GB, but every entry was used within the grace window",
                style("!").yellow(),
                eviction.resident_gb,
                eviction.target_gb
            );
        } else {
            println!(
                "Nothing to evict ({:.1} GB resident, target {:.1} GB).",
                eviction.resident_gb, eviction.target_gb
            );
        }
        return Ok(());
    }

    for entry in &eviction.evicted {
        println!(
            "  {} {} ({:.1} GB)",
            style("•").red(),
            entry.model_id,
            entry.size_gb
        );
    }
    println!(
        "{} evicted {} model(s), freed {:.1} GB; now {:.1} GB resident",
        style("✓").green(),
        eviction.evicted.len(),
        eviction.freed_gb(),
        eviction.resident_gb
    );
    println!("Run `modeltier reclaim` to remove the artifacts from disk.");

    Ok(())
}
