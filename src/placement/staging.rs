//! Staging namespace for in-flight fetches
//!
//! A staging directory lives directly under the cache-tier root so the
//! final promotion is a same-filesystem rename.

use crate::error::{TierError, TierResult};
use crate::validate::sanitize_for_filesystem;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Shape of a validated staged artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactShape {
    /// A directory holding one or more regular files
    Directory { files: u64, bytes: u64 },
    /// A single regular file
    File { bytes: u64 },
}

impl ArtifactShape {
    /// Total payload size in bytes
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Directory { bytes, .. } | Self::File { bytes } => *bytes,
        }
    }
}

/// A staging location owned by the placement holding the lock
///
/// Dropping an area that was neither promoted nor cleaned up removes it,
/// so a cancelled placement leaves nothing behind.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    live: bool,
}

impl StagingArea {
    /// Staging path for `model_id` under `root`
    pub fn path_for(root: &Path, prefix: &str, model_id: &str) -> PathBuf {
        root.join(format!("{}{}", prefix, sanitize_for_filesystem(model_id)))
    }

    /// Create an empty staging directory, clearing any leftover from a
    /// crashed placement of the same model
    pub async fn create(root: &Path, prefix: &str, model_id: &str) -> TierResult<Self> {
        let path = Self::path_for(root, prefix, model_id);

        if tokio::fs::symlink_metadata(&path).await.is_ok() {
            warn!("Removing stale staging location {}", path.display());
            remove_path(&path)
                .await
                .map_err(|e| TierError::io(format!("removing stale staging {}", path.display()), e))?;
        }

        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| TierError::io(format!("creating staging {}", path.display()), e))?;

        debug!("Created staging directory {}", path.display());
        Ok(Self { path, live: true })
    }

    /// The staging location handed to fetchers
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate what the fetcher left in the staging location
    pub async fn inspect(&self) -> TierResult<Result<ArtifactShape, String>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || inspect_artifact(&path))
            .await
            .map_err(|e| TierError::Internal(format!("artifact inspection task failed: {e}")))
    }

    /// Remove the staging location, whatever its shape
    pub async fn cleanup(mut self) {
        self.live = false;
        match remove_path(&self.path).await {
            Ok(()) => debug!("Removed staging {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging {}: {}", self.path.display(), e),
        }
    }

    /// The staging location was renamed into place; nothing left to remove
    pub fn promoted(mut self) {
        self.live = false;
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        match remove_path_sync(&self.path) {
            Ok(()) => warn!("Removed abandoned staging {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove abandoned staging {}: {}", self.path.display(), e),
        }
    }
}

/// Remove a file, symlink, or directory tree without following symlinks
pub async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

fn remove_path_sync(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Total bytes of regular files at `path`, not following symlinks
pub fn disk_bytes(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        walk(path).map(|(_, bytes)| bytes)
    } else if meta.is_file() {
        Ok(meta.len())
    } else {
        Ok(0)
    }
}

/// Check a staged artifact: a nonempty file, or a directory with at least
/// one regular file and nonzero aggregate size
///
/// Symlinks are neither followed nor counted.
pub fn inspect_artifact(path: &Path) -> Result<ArtifactShape, String> {
    let meta = fs::symlink_metadata(path).map_err(|e| format!("staging location missing: {e}"))?;

    if meta.is_file() {
        return if meta.len() > 0 {
            Ok(ArtifactShape::File { bytes: meta.len() })
        } else {
            Err("artifact file is empty".to_string())
        };
    }

    if !meta.is_dir() {
        return Err("artifact is neither a regular file nor a directory".to_string());
    }

    let (files, bytes) = walk(path).map_err(|e| format!("reading staged artifact: {e}"))?;
    if files == 0 {
        return Err("artifact directory contains no regular files".to_string());
    }
    if bytes == 0 {
        return Err(format!("artifact directory has {files} file(s) but zero total size"));
    }

    Ok(ArtifactShape::Directory { files, bytes })
}

fn walk(dir: &Path) -> io::Result<(u64, u64)> {
    let mut files = 0;
    let mut bytes = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let (f, b) = walk(&entry.path())?;
            files += f;
            bytes += b;
        } else if file_type.is_file() {
            files += 1;
            bytes += entry.metadata()?.len();
        }
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn staging_name_is_sanitized() {
        let path = StagingArea::path_for(Path::new("/mnt/nvme"), ".tmp_", "meta-llama/Llama-2-7b");
        assert_eq!(path, PathBuf::from("/mnt/nvme/.tmp_meta-llama_Llama-2-7b"));
    }

    #[tokio::test]
    async fn create_replaces_stale_staging() {
        let root = TempDir::new().unwrap();
        let stale = StagingArea::path_for(root.path(), ".tmp_", "org/model");
        std::fs::create_dir(&stale).unwrap();
        std::fs::write(stale.join("partial.bin"), b"half").unwrap();

        let staging = StagingArea::create(root.path(), ".tmp_", "org/model").await.unwrap();
        assert!(staging.path().is_dir());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

        staging.cleanup().await;
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn dropped_staging_is_removed() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::create(root.path(), ".tmp_", "org/model").await.unwrap();
        std::fs::write(staging.path().join("partial.bin"), b"half").unwrap();
        let path = staging.path().to_path_buf();

        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn promoted_staging_is_kept() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::create(root.path(), ".tmp_", "org/model").await.unwrap();
        let path = staging.path().to_path_buf();

        staging.promoted();
        assert!(path.is_dir());
    }

    #[test]
    fn disk_bytes_counts_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.bin"), b"12345").unwrap();
        std::fs::write(dir.path().join("sub").join("b.bin"), b"678").unwrap();

        assert_eq!(disk_bytes(dir.path()).unwrap(), 8);
        assert_eq!(disk_bytes(&dir.path().join("a.bin")).unwrap(), 5);
    }

    #[test]
    fn inspect_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("config.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("sub").join("weights.bin"), b"0123456789").unwrap();

        let shape = inspect_artifact(dir.path()).unwrap();
        assert_eq!(shape, ArtifactShape::Directory { files: 2, bytes: 12 });
        assert_eq!(shape.bytes(), 12);
    }

    #[test]
    fn inspect_rejects_empty_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let err = inspect_artifact(dir.path()).unwrap_err();
        assert!(err.contains("no regular files"));
    }

    #[test]
    fn inspect_rejects_zero_size_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("empty.bin"), b"").unwrap();
        let err = inspect_artifact(dir.path()).unwrap_err();
        assert!(err.contains("zero total size"));
    }

    #[test]
    fn inspect_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("model.gguf");
        std::fs::write(&file, b"GGUF").unwrap();
        assert_eq!(inspect_artifact(&file).unwrap(), ArtifactShape::File { bytes: 4 });

        std::fs::write(&file, b"").unwrap();
        assert!(inspect_artifact(&file).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn inspect_ignores_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("big.bin"), b"outside data").unwrap();
        std::os::unix::fs::symlink(outside.path().join("big.bin"), dir.path().join("link.bin"))
            .unwrap();

        assert!(inspect_artifact(dir.path()).is_err());
    }
}
