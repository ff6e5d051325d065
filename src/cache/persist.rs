//! On-disk index and usage-pattern files

use crate::cache::entry::{CacheEntry, UsagePattern};
use crate::error::{TierError, TierResult};
use crate::validate::resolve_within;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const INDEX_FILE: &str = "cache_metadata.json";
pub const PATTERN_FILE: &str = "usage_patterns.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    entries: Vec<CacheEntry>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    patterns: Vec<UsagePattern>,
    timestamp: DateTime<Utc>,
}

/// State read back at startup
#[derive(Debug, Default)]
pub struct Restored {
    pub entries: Vec<CacheEntry>,
    pub patterns: Vec<UsagePattern>,
    /// Entries whose artifact is gone or outside the root
    pub dropped: Vec<String>,
}

/// Reads and writes the persisted index under the state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
    dir: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrite both files wholesale
    pub async fn save(&self, entries: &[CacheEntry], patterns: &[UsagePattern]) -> TierResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TierError::io(format!("creating state directory {}", self.dir.display()), e))?;

        let timestamp = Utc::now();
        write_json(
            &self.dir.join(INDEX_FILE),
            &IndexFile {
                entries: entries.to_vec(),
                timestamp,
            },
        )
        .await?;
        write_json(
            &self.dir.join(PATTERN_FILE),
            &PatternFile {
                patterns: patterns.to_vec(),
                timestamp,
            },
        )
        .await?;

        debug!(
            "Persisted {} entries and {} patterns to {}",
            entries.len(),
            patterns.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Read persisted state, keeping only entries whose artifact still
    /// exists inside the root
    ///
    /// Missing files are an empty cache. Unreadable files are logged and
    /// treated as empty so a corrupt index never blocks startup.
    pub async fn load(&self) -> TierResult<Restored> {
        let index: Option<IndexFile> = read_json(&self.dir.join(INDEX_FILE)).await?;
        let patterns: Option<PatternFile> = read_json(&self.dir.join(PATTERN_FILE)).await?;

        let mut restored = Restored {
            patterns: patterns.map(|p| p.patterns).unwrap_or_default(),
            ..Default::default()
        };

        for mut entry in index.map(|i| i.entries).unwrap_or_default() {
            match self.revalidate(&entry.path).await {
                Some(path) => {
                    entry.path = path;
                    restored.entries.push(entry);
                }
                None => {
                    debug!("Dropping stale entry {} at {}", entry.model_id, entry.path.display());
                    restored.dropped.push(entry.model_id);
                }
            }
        }

        Ok(restored)
    }

    async fn revalidate(&self, path: &Path) -> Option<PathBuf> {
        if fs::symlink_metadata(path).await.is_err() {
            return None;
        }
        resolve_within(&self.root, path).ok()
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> TierResult<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TierError::io(format!("reading {}", path.display()), e)),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Ignoring unreadable state file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Write to a sibling temp file then rename over the destination
async fn write_json<T: Serialize>(path: &Path, value: &T) -> TierResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, content)
        .await
        .map_err(|e| TierError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| TierError::io(format!("replacing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn entry(root: &Path, id: &str) -> CacheEntry {
        let path = root.join("models").join(id);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("weights.bin"), b"w").unwrap();

        let mut metadata = BTreeMap::new();
        metadata.insert("quantization".to_string(), serde_json::json!("q4_0"));
        CacheEntry {
            model_id: id.to_string(),
            provider: Provider::Ollama,
            size_gb: 3.8,
            last_accessed: Utc::now(),
            access_count: 4,
            load_time_ms: 8123.5,
            path: path.canonicalize().unwrap(),
            metadata,
        }
    }

    #[tokio::test]
    async fn round_trip_drops_missing_paths() {
        let root = TempDir::new().unwrap();
        let store = StateStore::new(root.path(), root.path().join("cache"));

        let kept = entry(root.path(), "kept");
        let gone = entry(root.path(), "gone");
        let mut pattern = UsagePattern::new("kept");
        pattern.record(chrono::Local::now());

        store
            .save(&[kept.clone(), gone.clone()], &[pattern.clone()])
            .await
            .unwrap();
        std::fs::remove_dir_all(&gone.path).unwrap();

        let restored = store.load().await.unwrap();
        assert_eq!(restored.entries, vec![kept]);
        assert_eq!(restored.patterns, vec![pattern]);
        assert_eq!(restored.dropped, vec!["gone".to_string()]);
        assert!(!store.dir().join("cache_metadata.json.tmp").exists());
    }

    #[tokio::test]
    async fn drops_entries_outside_root() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let store = StateStore::new(root.path(), root.path().join("cache"));

        let mut escaped = entry(outside.path(), "escaped");
        escaped.path = outside.path().join("models").join("escaped");
        store.save(&[escaped], &[]).await.unwrap();

        let restored = store.load().await.unwrap();
        assert!(restored.entries.is_empty());
        assert_eq!(restored.dropped.len(), 1);
    }

    #[tokio::test]
    async fn missing_files_are_empty() {
        let root = TempDir::new().unwrap();
        let store = StateStore::new(root.path(), root.path().join("cache"));

        let restored = store.load().await.unwrap();
        assert!(restored.entries.is_empty());
        assert!(restored.patterns.is_empty());
    }

    #[tokio::test]
    async fn corrupt_index_is_ignored() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("cache");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(INDEX_FILE), "{ not json").unwrap();

        let restored = StateStore::new(root.path(), &dir).load().await.unwrap();
        assert!(restored.entries.is_empty());
    }
}
