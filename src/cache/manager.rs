//! Cache state manager
//!
//! Owns the LRU index behind a single mutex. Every method takes the lock
//! only for in-memory work; markers, persistence and placement happen after
//! it is released.

use crate::cache::entry::CacheEntry;
use crate::cache::index::{CacheIndex, CacheStats, Eviction};
use crate::cache::persist::StateStore;
use crate::cache::prefetch::{LogTrigger, PrefetchTrigger};
use crate::cache::reclaim::{self, ReclaimReport};
use crate::config::{CacheSettings, STATE_DIR};
use crate::error::{TierError, TierResult};
use crate::placement::{PlacedArtifact, PlacementCoordinator};
use crate::provider::Provider;
use crate::validate::{require_model_id, resolve_within, sanitize_for_filesystem};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Result of [`CacheStateManager::clear_cache`]
#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub cleared_models: usize,
    pub cleared_size_gb: f64,
    pub kept_models: usize,
    pub force: bool,
}

/// Result of [`CacheStateManager::load_model`]
#[derive(Debug)]
pub enum LoadOutcome {
    /// Already resident
    Hit {
        entry: CacheEntry,
        estimated_wait_ms: f64,
    },
    /// Fetched and placed
    Miss {
        entry: CacheEntry,
        placed: PlacedArtifact,
        estimated_wait_ms: f64,
    },
    /// Not admitted: no room even after evicting eligible entries
    Declined {
        size_gb: f64,
        estimated_wait_ms: f64,
    },
}

impl LoadOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// Wait the caller should have expected before the load started
    pub fn estimated_wait_ms(&self) -> f64 {
        match self {
            Self::Hit {
                estimated_wait_ms, ..
            }
            | Self::Miss {
                estimated_wait_ms, ..
            }
            | Self::Declined {
                estimated_wait_ms, ..
            } => *estimated_wait_ms,
        }
    }
}

/// Residency decisions for the cache tier
pub struct CacheStateManager {
    settings: CacheSettings,
    root: PathBuf,
    store: StateStore,
    index: Mutex<CacheIndex>,
    trigger: Arc<dyn PrefetchTrigger>,
}

impl CacheStateManager {
    /// Open the cache under `settings.root`, reloading persisted state
    pub async fn open(settings: CacheSettings) -> TierResult<Self> {
        let state_dir = settings.state_dir();
        tokio::fs::create_dir_all(&state_dir).await.map_err(|e| {
            TierError::io(format!("creating state directory {}", state_dir.display()), e)
        })?;
        let root = settings.root.canonicalize().map_err(|e| {
            TierError::io(format!("resolving cache-tier root {}", settings.root.display()), e)
        })?;

        let store = StateStore::new(&root, root.join(STATE_DIR));
        let restored = store.load().await?;
        if !restored.dropped.is_empty() {
            info!(
                "Dropped {} stale cache entries: {}",
                restored.dropped.len(),
                restored.dropped.join(", ")
            );
        }

        let mut index = CacheIndex::new(&settings);
        index.restore(restored.entries, restored.patterns);
        info!("Loaded {} cached models from {}", index.len(), store.dir().display());

        Ok(Self {
            settings,
            root,
            store,
            index: Mutex::new(index),
            trigger: Arc::new(LogTrigger),
        })
    }

    /// Replace the predictive pre-fetch hook
    pub fn with_trigger(mut self, trigger: Arc<dyn PrefetchTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Canonical cache-tier root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default artifact location for a model
    pub fn model_path(&self, provider: Provider, model_id: &str) -> PathBuf {
        self.root
            .join("models")
            .join(provider.as_str())
            .join(sanitize_for_filesystem(model_id))
    }

    fn index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, model_id: &str) -> Option<CacheEntry> {
        self.index().get(model_id).cloned()
    }

    pub fn is_resident(&self, model_id: &str) -> bool {
        self.index().contains(model_id)
    }

    /// Record a model access, inserting an entry if it is not resident
    ///
    /// `path` defaults to [`model_path`](Self::model_path) and must resolve
    /// inside the cache-tier root.
    pub async fn record_access(
        &self,
        model_id: &str,
        provider: Provider,
        size_gb: f64,
        load_time_ms: f64,
        path: Option<&Path>,
    ) -> TierResult<CacheEntry> {
        self.record_access_at(model_id, provider, size_gb, load_time_ms, path, Local::now())
            .await
    }

    pub(crate) async fn record_access_at(
        &self,
        model_id: &str,
        provider: Provider,
        size_gb: f64,
        load_time_ms: f64,
        path: Option<&Path>,
        now: DateTime<Local>,
    ) -> TierResult<CacheEntry> {
        require_model_id(model_id, provider.grammar())?;
        let default_path;
        let path = match path {
            Some(path) => path,
            None => {
                default_path = self.model_path(provider, model_id);
                &default_path
            }
        };
        let path = resolve_within(&self.root, path)?;

        let (entry, inserted) = self.index().record_access(
            model_id,
            provider,
            non_negative(size_gb),
            non_negative(load_time_ms),
            path,
            now,
        );

        if inserted {
            debug!("Cached new entry {} ({:.1} GB)", model_id, entry.size_gb);
            // A re-admitted model must not be reclaimed by a stale marker
            if let Err(e) = reclaim::cancel_marker(self.store.dir(), model_id).await {
                warn!("Failed to cancel deletion marker for {}: {}", model_id, e);
            }
        }
        Ok(entry)
    }

    /// Whether a model of `size_gb` can be admitted
    pub fn should_cache(&self, model_id: &str, size_gb: f64) -> bool {
        let admit = self.index().should_cache(non_negative(size_gb), Local::now());
        debug!("Admission for {} ({:.1} GB): {}", model_id, size_gb, admit);
        admit
    }

    /// Evict eligible entries until resident size is back under target
    pub async fn evict_pass(&self) -> TierResult<Eviction> {
        self.evict_pass_at(Local::now()).await
    }

    pub(crate) async fn evict_pass_at(&self, now: DateTime<Local>) -> TierResult<Eviction> {
        let eviction = self.index().evict_over_target(now);

        if eviction.evicted.is_empty() {
            if eviction.resident_gb > eviction.target_gb {
                warn!(
                    "Cache at {:.1} GB exceeds target {:.1} GB but no entry is eligible for eviction",
                    eviction.resident_gb, eviction.target_gb
                );
            }
            return Ok(eviction);
        }

        self.mark_all(&eviction.evicted).await;
        for entry in &eviction.evicted {
            info!("Evicted model: {}", entry.model_id);
        }
        info!(
            "Evicted {} models, freed {:.1} GB",
            eviction.evicted.len(),
            eviction.freed_gb()
        );
        Ok(eviction)
    }

    /// Fire the pre-fetch hook for models expected to peak next hour
    ///
    /// Returns the ids that were triggered successfully.
    pub async fn predictive_pass(&self) -> Vec<String> {
        self.predictive_pass_at(Local::now()).await
    }

    pub(crate) async fn predictive_pass_at(&self, now: DateTime<Local>) -> Vec<String> {
        let candidates = self.index().prefetch_candidates(now);

        let mut triggered = Vec::new();
        for pattern in candidates {
            info!(
                "Predictive pre-loading {} for peak hour {}",
                pattern.model_id, pattern.peak_hour
            );
            match self.trigger.trigger_load(&pattern.model_id, &pattern).await {
                Ok(()) => triggered.push(pattern.model_id),
                Err(e) => warn!("Pre-fetch trigger for {} failed: {}", pattern.model_id, e),
            }
        }
        triggered
    }

    /// Expected milliseconds until `model_id` is usable
    pub fn load_time_estimate(&self, model_id: &str) -> f64 {
        self.index().load_time_estimate(model_id)
    }

    /// Clear everything (`force`) or all but the most-accessed fifth
    pub async fn clear_cache(&self, force: bool) -> TierResult<ClearReport> {
        let cleared = self.index().clear(force);
        self.mark_all(&cleared.removed).await;

        let report = ClearReport {
            cleared_models: cleared.removed.len(),
            cleared_size_gb: cleared.removed.iter().map(|e| e.size_gb).sum(),
            kept_models: cleared.kept,
            force,
        };
        info!(
            "Cleared {} models ({:.1} GB), kept {}",
            report.cleared_models, report.cleared_size_gb, report.kept_models
        );
        Ok(report)
    }

    pub fn stats(&self) -> CacheStats {
        self.index().stats()
    }

    /// Write the index and patterns to disk
    pub async fn persist(&self) -> TierResult<()> {
        let (entries, patterns) = self.index().snapshot();
        self.store.save(&entries, &patterns).await
    }

    /// Physically remove artifacts behind pending deletion markers
    pub async fn reclaim(&self, dry_run: bool) -> TierResult<ReclaimReport> {
        let resident: HashSet<String> = self
            .index()
            .lru_order()
            .map(|e| e.model_id.clone())
            .collect();
        reclaim::reclaim(&self.root, self.store.dir(), &resident, dry_run).await
    }

    /// Serve a load request: record a hit, or admit, place and record a miss
    pub async fn load_model(
        &self,
        coordinator: &PlacementCoordinator,
        provider: Provider,
        model_id: &str,
    ) -> TierResult<LoadOutcome> {
        require_model_id(model_id, provider.grammar())?;

        if let Some(existing) = self.get(model_id) {
            let estimated_wait_ms = self.load_time_estimate(model_id);
            let entry = self
                .record_access(model_id, provider, existing.size_gb, 0.0, Some(&existing.path))
                .await?;
            return Ok(LoadOutcome::Hit {
                entry,
                estimated_wait_ms,
            });
        }

        let size_gb = provider.estimate_size_gb(model_id) as f64;
        let estimated_wait_ms = self.load_time_estimate(model_id);
        if !self.should_cache(model_id, size_gb) {
            info!("Declined to cache {} ({:.1} GB): no room", model_id, size_gb);
            return Ok(LoadOutcome::Declined {
                size_gb,
                estimated_wait_ms,
            });
        }

        let target = self.model_path(provider, model_id);
        let placed = coordinator
            .place_atomic(provider.as_str(), model_id, &target)
            .await?;

        let placed_gb = placed.size_gb();
        let entry = self
            .record_access(
                model_id,
                provider,
                if placed_gb > 0.0 { placed_gb } else { size_gb },
                placed.elapsed.as_secs_f64() * 1000.0,
                Some(&placed.path),
            )
            .await?;

        Ok(LoadOutcome::Miss {
            entry,
            placed,
            estimated_wait_ms,
        })
    }

    /// Final best-effort persist before the process exits
    pub async fn shutdown(&self) {
        match self.persist().await {
            Ok(()) => info!("Cache state persisted on shutdown"),
            Err(e) => error!("Failed to persist cache state on shutdown: {}", e),
        }
    }

    async fn mark_all(&self, entries: &[CacheEntry]) {
        for entry in entries {
            if let Err(e) = reclaim::write_marker(self.store.dir(), entry).await {
                error!("Failed to mark {} for deletion: {}", entry.model_id, e);
            }
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
