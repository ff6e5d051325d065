//! Atomic placement of fetched artifacts into the cache tier

use crate::config::{PlacementSettings, STATE_DIR};
use crate::error::{TierError, TierResult};
use crate::placement::clean::{find_leftovers, CleanReport};
use crate::placement::fetcher::FetcherRegistry;
use crate::placement::lock::PlacementLock;
use crate::placement::staging::{remove_path, ArtifactShape, StagingArea};
use crate::provider::Provider;
use crate::validate::{require_model_id, resolve_within};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A finalized artifact
#[derive(Debug, Clone)]
pub struct PlacedArtifact {
    /// Resolved final path inside the cache-tier root
    pub path: PathBuf,
    /// Shape and size of what was promoted
    pub shape: ArtifactShape,
    /// Where a previous artifact at `path` was moved, if any
    pub backup: Option<PathBuf>,
    /// Wall time from lock acquisition to promotion
    pub elapsed: Duration,
}

impl PlacedArtifact {
    /// Artifact size in GB
    pub fn size_gb(&self) -> f64 {
        self.shape.bytes() as f64 / BYTES_PER_GB
    }
}

/// Serializes fetch-stage-verify-promote sequences across the host
pub struct PlacementCoordinator {
    root: PathBuf,
    lock_path: PathBuf,
    staging_prefix: String,
    fetchers: FetcherRegistry,
    /// Read-held by each placement so shutdown can wait for them
    inflight: RwLock<()>,
}

impl PlacementCoordinator {
    /// Create a coordinator, creating the cache-tier root if needed
    pub fn new(settings: &PlacementSettings, fetchers: FetcherRegistry) -> TierResult<Self> {
        std::fs::create_dir_all(&settings.root).map_err(|e| {
            TierError::io(format!("creating cache-tier root {}", settings.root.display()), e)
        })?;
        let root = settings.root.canonicalize().map_err(|e| {
            TierError::io(format!("resolving cache-tier root {}", settings.root.display()), e)
        })?;

        Ok(Self {
            lock_path: root.join(&settings.lock_file),
            root,
            staging_prefix: settings.staging_prefix.clone(),
            fetchers,
            inflight: RwLock::new(()),
        })
    }

    /// Canonical cache-tier root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the advisory lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Fetch `model_id` from `provider` and promote it to `target`
    ///
    /// Either `target` ends up holding the complete artifact or nothing in
    /// the cache tier changes. Fails fast with
    /// [`TierError::LockContention`] if another placement is running.
    pub async fn place_atomic(
        &self,
        provider: &str,
        model_id: &str,
        target: &Path,
    ) -> TierResult<PlacedArtifact> {
        let parsed = provider.parse::<Provider>();
        let grammar = parsed.as_ref().map(|p| p.grammar()).unwrap_or(provider);
        require_model_id(model_id, grammar)?;
        let provider = parsed?;

        let target = resolve_within(&self.root, target)?;
        self.check_outside_staging(&target)?;

        let _inflight = self.inflight.read().await;
        let lock = PlacementLock::try_acquire(&self.lock_path)?;

        let result = self.place_locked(provider, model_id, &target).await;

        drop(lock);
        match &result {
            Ok(placed) => info!(
                "Placed {} ({}) at {} in {:.1}s",
                model_id,
                provider,
                placed.path.display(),
                placed.elapsed.as_secs_f64()
            ),
            Err(e) => warn!("Placement of {} ({}) failed: {}", model_id, provider, e),
        }
        result
    }

    /// Remove leftover staging directories and replaced-artifact backups
    ///
    /// Holds the placement lock for the whole sweep so an in-flight
    /// placement's staging is never mistaken for a leftover. `dry_run` only
    /// lists.
    pub async fn clean(&self, dry_run: bool) -> TierResult<CleanReport> {
        let _inflight = self.inflight.read().await;
        let _lock = PlacementLock::try_acquire(&self.lock_path)?;

        let root = self.root.clone();
        let prefix = self.staging_prefix.clone();
        let found = tokio::task::spawn_blocking(move || find_leftovers(&root, &prefix))
            .await
            .map_err(|e| TierError::Internal(format!("leftover scan task failed: {e}")))?
            .map_err(|e| TierError::io(format!("scanning {}", self.root.display()), e))?;

        let mut report = CleanReport {
            dry_run,
            ..Default::default()
        };
        for leftover in found {
            if dry_run {
                report.removed.push(leftover);
                continue;
            }
            match remove_path(&leftover.path).await {
                Ok(()) => {
                    info!("Removed {} {}", leftover.kind, leftover.path.display());
                    report.removed.push(leftover);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", leftover.path.display(), e);
                    report.failed.push((leftover.path, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Wait for any in-flight placement to finish
    pub async fn drain(&self) {
        let _guard = self.inflight.write().await;
        debug!("Placement coordinator drained");
    }

    async fn place_locked(
        &self,
        provider: Provider,
        model_id: &str,
        target: &Path,
    ) -> TierResult<PlacedArtifact> {
        let started = Instant::now();
        let fetcher = self.fetchers.resolve(provider)?;

        let estimate_gb = fetcher.estimate_size_gb(model_id).await?;
        let required_gb = estimate_gb * 2.0;
        let available_gb = fs2::available_space(&self.root).map_err(|e| {
            TierError::io(format!("checking free space on {}", self.root.display()), e)
        })? as f64
            / BYTES_PER_GB;
        if available_gb < required_gb {
            return Err(TierError::InsufficientSpace {
                required_gb,
                available_gb,
            });
        }

        let staging = StagingArea::create(&self.root, &self.staging_prefix, model_id).await?;
        debug!("Fetching {} into {}", model_id, staging.path().display());

        let failure = match fetcher.fetch_to_path(model_id, staging.path()).await {
            Ok(true) => None,
            Ok(false) => Some("fetcher reported failure".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            staging.cleanup().await;
            return Err(TierError::FetchFailed {
                model_id: model_id.to_string(),
                reason,
            });
        }

        let shape = match staging.inspect().await {
            Ok(Ok(shape)) => shape,
            Ok(Err(reason)) => {
                staging.cleanup().await;
                return Err(TierError::ArtifactValidationFailed {
                    model_id: model_id.to_string(),
                    reason,
                });
            }
            Err(e) => {
                staging.cleanup().await;
                return Err(e);
            }
        };

        let backup = match promote(staging.path(), target, &backup_path(target)).await {
            Ok(backup) => backup,
            Err(e) => {
                staging.cleanup().await;
                return Err(e);
            }
        };
        staging.promoted();

        Ok(PlacedArtifact {
            path: target.to_path_buf(),
            shape,
            backup,
            elapsed: started.elapsed(),
        })
    }

    /// Staging, the lock file and persisted state are reserved names
    fn check_outside_staging(&self, target: &Path) -> TierResult<()> {
        let inside_staging = target
            .strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
            .is_some_and(|first| {
                let first = first.as_os_str().to_string_lossy();
                first.starts_with(self.staging_prefix.as_str())
                    || first == self.lock_file_name()
                    || first == STATE_DIR
            });

        if inside_staging {
            return Err(TierError::PathBoundaryViolation {
                path: target.to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    fn lock_file_name(&self) -> String {
        self.lock_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Rename `staging` onto `target`, moving any existing artifact to `backup`
/// first and back again if the final rename fails
async fn promote(staging: &Path, target: &Path, backup: &Path) -> TierResult<Option<PathBuf>> {
    let placement_failed = |source| TierError::PlacementFailed {
        staging: staging.to_path_buf(),
        target: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(placement_failed)?;
    }

    let backup = if tokio::fs::symlink_metadata(target).await.is_ok() {
        warn!(
            "Target {} exists, moving it aside to {}",
            target.display(),
            backup.display()
        );
        tokio::fs::rename(target, backup)
            .await
            .map_err(placement_failed)?;
        Some(backup.to_path_buf())
    } else {
        None
    };

    if let Err(e) = tokio::fs::rename(staging, target).await {
        if let Some(ref backup) = backup {
            match tokio::fs::rename(backup, target).await {
                Ok(()) => info!("Restored {} from {}", target.display(), backup.display()),
                Err(restore) => warn!(
                    "Failed to restore {} from {}: {}",
                    target.display(),
                    backup.display(),
                    restore
                ),
            }
        }
        return Err(placement_failed(e));
    }

    Ok(backup)
}

/// Timestamped sibling used to keep a replaced artifact
fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
    target.with_file_name(format!("{name}.backup.{stamp}"))
}
