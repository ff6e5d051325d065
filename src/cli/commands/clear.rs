//! Clear command - drop cached entries

use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::TierResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> TierResult<()> {
    let manager = super::open_cache(config).await?;
    let stats = manager.stats();

    if stats.num_cached_models == 0 && !args.force {
        println!("No cached models to clear.");
        return Ok(());
    }

    if args.force {
        println!(
            "This will evict all {} cached model(s) and forget all usage patterns.",
            stats.num_cached_models
        );
    } else {
        println!(
            "This will evict all but the most-accessed fifth of {} cached model(s).",
            stats.num_cached_models
        );
    }

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = manager.clear_cache(args.force).await?;
    manager.persist().await?;

    println!(
        "{} cleared {} model(s), {:.1} GB; kept {}",
        style("✓").green(),
        report.cleared_models,
        report.cleared_size_gb,
        report.kept_models
    );

    Ok(())
}
