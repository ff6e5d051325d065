//! Deletion markers and physical reclamation
//!
//! Eviction only removes an entry from the index and drops a marker next to
//! the persisted state. Reclamation reads those markers later and removes
//! the artifacts, so logical eviction never waits on a large `rm -r`.

use crate::cache::entry::CacheEntry;
use crate::error::{TierError, TierResult};
use crate::placement::staging::remove_path;
use crate::provider::Provider;
use crate::validate::{resolve_within, sanitize_for_filesystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

pub const MARKER_PREFIX: &str = ".delete_";

/// Longest sanitized id kept in a marker name
const MARKER_ID_CHARS: usize = 200;

/// Request to physically remove an evicted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionMarker {
    pub model_id: String,
    pub provider: Provider,
    pub path: PathBuf,
    pub size_gb: f64,
    pub marked_at: DateTime<Utc>,
}

impl From<&CacheEntry> for DeletionMarker {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            model_id: entry.model_id.clone(),
            provider: entry.provider,
            path: entry.path.clone(),
            size_gb: entry.size_gb,
            marked_at: Utc::now(),
        }
    }
}

/// Outcome of one reclamation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclaimReport {
    pub dry_run: bool,
    /// Models whose artifact was (or would be) removed
    pub reclaimed: Vec<String>,
    /// Markers left in place, with the reason
    pub skipped: Vec<(String, String)>,
    pub freed_gb: f64,
}

/// Marker file name for `model_id`
///
/// The hash suffix keeps ids that sanitize to the same name apart.
pub fn marker_name(model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    let hash = hex::encode(&hasher.finalize()[..6]);

    let stem: String = sanitize_for_filesystem(model_id)
        .chars()
        .take(MARKER_ID_CHARS)
        .collect();
    format!("{MARKER_PREFIX}{stem}-{hash}")
}

/// Write a marker for `entry` into `dir`
pub async fn write_marker(dir: &Path, entry: &CacheEntry) -> TierResult<PathBuf> {
    let path = dir.join(marker_name(&entry.model_id));
    let content = serde_json::to_string_pretty(&DeletionMarker::from(entry))?;
    fs::write(&path, content)
        .await
        .map_err(|e| TierError::io(format!("writing deletion marker {}", path.display()), e))?;

    debug!("Marked {} for deletion", entry.model_id);
    Ok(path)
}

/// Remove a pending marker for `model_id`, if any
pub async fn cancel_marker(dir: &Path, model_id: &str) -> TierResult<bool> {
    let path = dir.join(marker_name(model_id));
    match fs::remove_file(&path).await {
        Ok(()) => {
            debug!("Cancelled deletion marker for {}", model_id);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TierError::io(format!("removing marker {}", path.display()), e)),
    }
}

/// Markers currently in `dir`; unreadable markers are logged and skipped
pub async fn pending_markers(dir: &Path) -> TierResult<Vec<(PathBuf, DeletionMarker)>> {
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TierError::io(format!("listing {}", dir.display()), e)),
    };

    let mut markers = Vec::new();
    while let Some(item) = reader
        .next_entry()
        .await
        .map_err(|e| TierError::io(format!("listing {}", dir.display()), e))?
    {
        if !item.file_name().to_string_lossy().starts_with(MARKER_PREFIX) {
            continue;
        }

        let path = item.path();
        let parsed = fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<DeletionMarker>(&content).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(marker) => markers.push((path, marker)),
            Err(e) => warn!("Skipping unreadable marker {}: {}", path.display(), e),
        }
    }

    markers.sort_by(|a, b| a.1.marked_at.cmp(&b.1.marked_at));
    Ok(markers)
}

/// Remove marked artifacts under `root`
///
/// Markers for models in `resident` are left alone: the model came back
/// after it was evicted. Paths that no longer resolve inside `root` are
/// never touched.
pub async fn reclaim(
    root: &Path,
    dir: &Path,
    resident: &HashSet<String>,
    dry_run: bool,
) -> TierResult<ReclaimReport> {
    let mut report = ReclaimReport {
        dry_run,
        ..Default::default()
    };

    for (marker_path, marker) in pending_markers(dir).await? {
        if resident.contains(&marker.model_id) {
            report
                .skipped
                .push((marker.model_id, "model is resident again".to_string()));
            continue;
        }

        let exists = fs::symlink_metadata(&marker.path).await.is_ok();
        let target = if exists {
            match resolve_within(root, &marker.path) {
                Ok(target) => Some(target),
                Err(e) => {
                    warn!("Refusing to reclaim {}: {}", marker.path.display(), e);
                    report.skipped.push((marker.model_id, e.to_string()));
                    continue;
                }
            }
        } else {
            None
        };

        if dry_run {
            report.freed_gb += marker.size_gb;
            report.reclaimed.push(marker.model_id);
            continue;
        }

        if let Some(target) = target {
            if let Err(e) = remove_path(&target).await {
                warn!("Failed to remove {}: {}", target.display(), e);
                report.skipped.push((marker.model_id, e.to_string()));
                continue;
            }
            info!("Reclaimed {} ({:.1} GB)", marker.model_id, marker.size_gb);
            report.freed_gb += marker.size_gb;
        }

        fs::remove_file(&marker_path).await.map_err(|e| {
            TierError::io(format!("removing marker {}", marker_path.display()), e)
        })?;
        report.reclaimed.push(marker.model_id);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn resident_entry(root: &Path, id: &str) -> CacheEntry {
        let path = root.join("models").join(sanitize_for_filesystem(id));
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("weights.bin"), b"weights").unwrap();
        CacheEntry {
            model_id: id.to_string(),
            provider: Provider::HuggingFace,
            size_gb: 2.5,
            last_accessed: Utc::now(),
            access_count: 1,
            load_time_ms: 0.0,
            path,
            metadata: BTreeMap::new(),
        }
    }

    fn state_dir(root: &TempDir) -> PathBuf {
        let dir = root.path().join("cache");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn marker_names_disambiguate() {
        let a = marker_name("org/model");
        let b = marker_name("org_model");
        assert_ne!(a, b);
        assert!(a.starts_with(".delete_org_model-"));
        assert_eq!(a.len(), ".delete_org_model-".len() + 12);
        assert!(marker_name(&"x".repeat(256)).len() < 255);
    }

    #[tokio::test]
    async fn reclaim_removes_artifact_and_marker() {
        let root = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(root.path(), "org/model");

        let marker = write_marker(&dir, &entry).await.unwrap();
        let report = reclaim(root.path(), &dir, &HashSet::new(), false).await.unwrap();

        assert_eq!(report.reclaimed, vec!["org/model".to_string()]);
        assert!((report.freed_gb - 2.5).abs() < 1e-9);
        assert!(!entry.path.exists());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let root = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(root.path(), "org/model");
        let marker = write_marker(&dir, &entry).await.unwrap();

        let report = reclaim(root.path(), &dir, &HashSet::new(), true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.reclaimed.len(), 1);
        assert!(entry.path.exists());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn resident_models_are_skipped() {
        let root = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(root.path(), "org/model");
        write_marker(&dir, &entry).await.unwrap();

        let resident: HashSet<String> = ["org/model".to_string()].into_iter().collect();
        let report = reclaim(root.path(), &dir, &resident, false).await.unwrap();
        assert!(report.reclaimed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(entry.path.exists());
    }

    #[tokio::test]
    async fn paths_outside_root_are_refused() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(outside.path(), "org/model");
        write_marker(&dir, &entry).await.unwrap();

        let report = reclaim(root.path(), &dir, &HashSet::new(), false).await.unwrap();
        assert!(report.reclaimed.is_empty());
        assert!(entry.path.exists());
    }

    #[tokio::test]
    async fn marker_for_missing_artifact_is_cleared() {
        let root = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(root.path(), "org/model");
        let marker = write_marker(&dir, &entry).await.unwrap();
        std::fs::remove_dir_all(&entry.path).unwrap();

        let report = reclaim(root.path(), &dir, &HashSet::new(), false).await.unwrap();
        assert_eq!(report.reclaimed.len(), 1);
        assert_eq!(report.freed_gb, 0.0);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn cancel_marker_removes_pending() {
        let root = TempDir::new().unwrap();
        let dir = state_dir(&root);
        let entry = resident_entry(root.path(), "org/model");
        write_marker(&dir, &entry).await.unwrap();

        assert!(cancel_marker(&dir, "org/model").await.unwrap());
        assert!(!cancel_marker(&dir, "org/model").await.unwrap());
        assert!(pending_markers(&dir).await.unwrap().is_empty());
    }
}
