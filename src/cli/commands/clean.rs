//! Clean command - sweep leftover staging and backups from the cache tier

use crate::cli::args::CleanArgs;
use crate::config::{Config, PlacementSettings};
use crate::error::TierResult;
use crate::placement::{FetcherRegistry, Leftover, PlacementCoordinator};
use console::style;
use std::io::{self, Write};

/// Execute the clean command
pub async fn execute(args: CleanArgs, config: &Config) -> TierResult<()> {
    // Sweeping needs the lock, not a fetcher
    let coordinator =
        PlacementCoordinator::new(&PlacementSettings::from(config), FetcherRegistry::new())?;

    let preview = coordinator.clean(true).await?;
    if preview.removed.is_empty() {
        println!("No leftover staging or backup files.");
        return Ok(());
    }

    println!("{}", style("Files to be removed").bold());
    for leftover in &preview.removed {
        print_leftover(leftover);
    }
    println!();
    println!("Total space to recover: {:.2} GB", preview.freed_gb());

    if args.dry_run {
        println!("Dry run - nothing removed.");
        return Ok(());
    }

    if !args.yes {
        print!("Proceed with cleanup? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cleanup cancelled.");
            return Ok(());
        }
    }

    let report = coordinator.clean(false).await?;
    for (path, reason) in &report.failed {
        println!("  {} {} ({})", style("!").yellow(), path.display(), reason);
    }
    println!(
        "{} removed {} item(s), recovered {:.2} GB",
        style("✓").green(),
        report.removed.len(),
        report.freed_gb()
    );

    Ok(())
}

fn print_leftover(leftover: &Leftover) {
    println!(
        "  {} {:<8} {} ({:.1} MB)",
        style("•").red(),
        leftover.kind.to_string(),
        leftover.path.display(),
        leftover.bytes as f64 / (1024.0 * 1024.0)
    );
}
