//! Watch command - run the background loops in the foreground

use crate::cache::BackgroundTasks;
use crate::config::Config;
use crate::error::{TierError, TierResult};
use console::style;
use std::sync::Arc;
use tracing::info;

/// Execute the watch command
pub async fn execute(config: &Config) -> TierResult<()> {
    let manager = Arc::new(super::open_cache(config).await?);
    let settings = manager.settings();

    println!(
        "Watching {} (evict every {}s, predict every {}s, persist every {}s). Ctrl-C to stop.",
        manager.root().display(),
        settings.eviction_interval.as_secs(),
        settings.prediction_interval.as_secs(),
        settings.persist_interval.as_secs()
    );

    let tasks = BackgroundTasks::spawn(manager.clone());

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutting down background loops");
    tasks.stop().await;
    manager.shutdown().await;

    signal.map_err(|e| TierError::io("waiting for Ctrl-C", e))?;
    println!("{} stopped, cache state saved", style("✓").green());
    Ok(())
}
