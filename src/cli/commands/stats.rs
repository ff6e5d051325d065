//! Stats command - show cache residency and usage patterns

use crate::cache::index::EntrySummary;
use crate::cache::CacheStats;
use crate::cli::args::{OutputFormat, StatsArgs};
use crate::config::Config;
use crate::error::TierResult;
use console::style;

/// Execute the stats command
pub async fn execute(args: StatsArgs, config: &Config) -> TierResult<()> {
    let manager = super::open_cache(config).await?;
    let stats = manager.stats();

    match args.format {
        OutputFormat::Table => print_stats_table(&stats, &manager.root().display().to_string()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

fn print_stats_table(stats: &CacheStats, root: &str) {
    let utilization = stats.cache_utilization * 100.0;
    let usage = format!(
        "{:.1} GB / {:.1} GB ({:.1}%)",
        stats.cache_size_gb, stats.max_cache_size_gb, utilization
    );
    let usage = if stats.cache_size_gb > stats.target_size_gb {
        style(usage).yellow().to_string()
    } else {
        style(usage).green().to_string()
    };

    println!("{:<12} {}", "Cache tier:", root);
    println!("{:<12} {}", "Resident:", usage);
    println!(
        "{:<12} {:.1} GB ({:.0}% kept free)",
        "Target:",
        stats.target_size_gb,
        stats.target_free_fraction * 100.0
    );
    println!(
        "{:<12} {} ({} accesses)",
        "Models:", stats.num_cached_models, stats.total_accesses
    );

    if stats.num_cached_models == 0 {
        println!();
        println!("No cached models.");
    } else {
        print_entries("Most recently used", &stats.most_recently_used);
        print_entries("Least recently used", &stats.least_recently_used);
    }

    if !stats.usage_patterns.is_empty() {
        println!();
        println!("{}", style("Usage patterns").bold());
        println!(
            "{:<40} {:>9} {:>8} {:>9} {:>7}",
            "MODEL", "PEAK HOUR", "PEAK DAY", "AVG/DAY", "TOTAL"
        );
        println!("{}", "-".repeat(77));
        for pattern in &stats.usage_patterns {
            println!(
                "{:<40} {:>9} {:>8} {:>9.1} {:>7}",
                pattern.model_id,
                format!("{:02}:00", pattern.peak_hour),
                pattern.peak_day,
                pattern.avg_daily_requests,
                pattern.total_requests
            );
        }
    }
}

fn print_entries(title: &str, entries: &[EntrySummary]) {
    println!();
    println!("{}", style(title).bold());
    println!(
        "{:<40} {:<12} {:>8} {:<17} {:>6}",
        "MODEL", "PROVIDER", "SIZE GB", "LAST ACCESSED", "COUNT"
    );
    println!("{}", "-".repeat(87));
    for entry in entries {
        let last = entry
            .last_accessed
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        println!(
            "{:<40} {:<12} {:>8.1} {:<17} {:>6}",
            entry.model_id,
            entry.provider.as_str(),
            entry.size_gb,
            last,
            entry.access_count
        );
    }
}
