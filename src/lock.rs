//! File-based locking for single-process safety.
//!
//! Cross-platform (fs2) advisory lock:
//! - Exclusive: one engine instance per directory.
//!
//! Lock file path: <dir>/LOCK
//! Lock is released on Drop.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

pub(crate) const LOCK_FILE: &str = "LOCK";

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn lock_file_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE)
}

/// Try to acquire the directory's exclusive lock. Fails with
/// `DatabaseIsUsing` if another process holds it.
pub fn try_acquire_exclusive_lock(dir: &Path) -> Result<LockGuard> {
    let path = lock_file_path(dir);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;
    file.try_lock_exclusive()
        .map_err(|_| Error::DatabaseIsUsing)?;
    Ok(LockGuard { file, path })
}
