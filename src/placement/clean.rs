//! Leftover sweep
//!
//! Crashed placements can leave staging directories at the top of the
//! root, and every replacement keeps a `<name>.backup.<stamp>` sibling.
//! Neither is tracked by the cache index, so they are found by name.

use crate::config::STATE_DIR;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::staging::disk_bytes;

/// Infix separating an artifact name from its backup timestamp
pub const BACKUP_INFIX: &str = ".backup.";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeftoverKind {
    Staging,
    Backup,
}

impl fmt::Display for LeftoverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staging => write!(f, "staging"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

/// A path the sweep would remove
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leftover {
    pub path: PathBuf,
    pub kind: LeftoverKind,
    pub bytes: u64,
}

/// Outcome of [`PlacementCoordinator::clean`](super::PlacementCoordinator::clean)
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub dry_run: bool,
    /// Leftovers removed (or, on a dry run, that would be)
    pub removed: Vec<Leftover>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanReport {
    pub fn freed_gb(&self) -> f64 {
        self.removed.iter().map(|l| l.bytes).sum::<u64>() as f64 / BYTES_PER_GB
    }
}

/// `<name>.backup.<stamp>` where the stamp is digits and `T`
pub fn is_backup_name(name: &str) -> bool {
    match name.rsplit_once(BACKUP_INFIX) {
        Some((stem, stamp)) => {
            !stem.is_empty()
                && !stamp.is_empty()
                && stamp.chars().all(|c| c.is_ascii_digit() || c == 'T')
        }
        None => false,
    }
}

/// Staging entries directly under `root` plus backups anywhere below it
///
/// The persisted-state directory is skipped and symlinks are never
/// followed.
pub fn find_leftovers(root: &Path, staging_prefix: &str) -> io::Result<Vec<Leftover>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(staging_prefix) {
            found.push(leftover(entry.path(), LeftoverKind::Staging)?);
        } else if name != STATE_DIR {
            scan(&entry.path(), &name, &mut found)?;
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn scan(path: &Path, name: &str, found: &mut Vec<Leftover>) -> io::Result<()> {
    if is_backup_name(name) {
        found.push(leftover(path.to_path_buf(), LeftoverKind::Backup)?);
        return Ok(());
    }

    if fs::symlink_metadata(path)?.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            scan(&entry.path(), &entry.file_name().to_string_lossy(), found)?;
        }
    }
    Ok(())
}

fn leftover(path: PathBuf, kind: LeftoverKind) -> io::Result<Leftover> {
    let bytes = disk_bytes(&path)?;
    Ok(Leftover { path, kind, bytes })
}
