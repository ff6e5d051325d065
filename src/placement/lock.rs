//! System-wide advisory placement lock
//!
//! One lock file under the cache-tier root arbitrates which process may
//! mutate artifacts. Acquisition never waits: a held lock surfaces as
//! [`TierError::LockContention`] so callers see backpressure immediately.

use crate::error::{TierError, TierResult};
use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held exclusive lock; released when dropped
#[derive(Debug)]
pub struct PlacementLock {
    file: File,
    path: PathBuf,
}

impl PlacementLock {
    /// Try to take the exclusive lock at `path` without blocking
    pub fn try_acquire(path: &Path) -> TierResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| TierError::io(format!("opening lock file {}", path.display()), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => {
                debug!("Placement lock held by another placement: {}", path.display());
                return Err(TierError::LockContention(path.to_path_buf()));
            }
            Err(e) => {
                return Err(TierError::io(
                    format!("locking {}", path.display()),
                    e,
                ))
            }
        }

        let mut lock = Self {
            file,
            path: path.to_path_buf(),
        };

        // Holder info is for operators only; the flock is what matters
        if let Err(e) = lock.write_holder() {
            warn!("Failed to record lock holder in {}: {}", path.display(), e);
        }

        debug!("Acquired placement lock {}", path.display());
        Ok(lock)
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_holder(&mut self) -> std::io::Result<()> {
        let holder = serde_json::json!({
            "pid": std::process::id(),
            "acquired_at": Utc::now().to_rfc3339(),
        });
        self.file.set_len(0)?;
        self.file.write_all(holder.to_string().as_bytes())?;
        self.file.flush()
    }
}

impl Drop for PlacementLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release placement lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released placement lock {}", self.path.display());
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
