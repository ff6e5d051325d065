//! Periodic eviction, prediction and persistence loops

use crate::cache::manager::CacheStateManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Handles to the running background loops
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Start the three loops on the current runtime
    ///
    /// A failing or panicking cycle is logged and the loop keeps its
    /// schedule.
    pub fn spawn(manager: Arc<CacheStateManager>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let settings = manager.settings().clone();

        let evict = {
            let manager = manager.clone();
            spawn_loop("eviction", settings.eviction_interval, rx.clone(), move || {
                let manager = manager.clone();
                async move {
                    if let Err(e) = manager.evict_pass().await {
                        error!("Eviction monitor error: {}", e);
                    }
                }
            })
        };

        let predict = {
            let manager = manager.clone();
            spawn_loop("prediction", settings.prediction_interval, rx.clone(), move || {
                let manager = manager.clone();
                async move {
                    let triggered = manager.predictive_pass().await;
                    if !triggered.is_empty() {
                        debug!("Pre-fetch triggered for {}", triggered.join(", "));
                    }
                }
            })
        };

        let persist = spawn_loop("persistence", settings.persist_interval, rx, move || {
            let manager = manager.clone();
            async move {
                if let Err(e) = manager.persist().await {
                    error!("Metadata persister error: {}", e);
                }
            }
        });

        Self {
            shutdown,
            handles: vec![evict, predict, persist],
        }
    }

    /// Signal the loops and wait for any running cycle to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Background task ended abnormally: {}", e);
            }
        }
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Own task per cycle so a panicking hook cannot end the loop
                    if let Err(e) = tokio::spawn(cycle()).await {
                        error!("{} cycle aborted: {}", name, e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("{} loop stopped", name);
    })
}
