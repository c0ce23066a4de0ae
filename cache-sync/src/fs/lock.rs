//! Per-entry advisory file locks.
//!
//! Each cache entry directory holds a `.lock` file; an exclusive `flock()`
//! on it serialises writers across processes on the same machine. The lock
//! is released when the guard is dropped, including during unwinding.

use crate::cache::path::LOCK_FILENAME;
use crate::utils::errors::{Result, SyncError};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held exclusive lock on a cache entry directory.
pub struct EntryLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl EntryLock {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        debug!("released lock {}", self.path.display());
    }
}

/// Block until the lock for `entry_dir` is held.
///
/// Creates the directory and lock file if needed. Blocks the calling
/// thread; async callers should go through `spawn_blocking`.
pub fn acquire_lock(entry_dir: &Path) -> Result<EntryLock> {
    let (file, path) = open_lock_file(entry_dir)?;
    match Flock::lock(file, FlockArg::LockExclusive) {
        Ok(lock) => {
            debug!("acquired lock {}", path.display());
            Ok(EntryLock { _lock: lock, path })
        }
        Err((_file, e)) => Err(SyncError::Lock(format!("failed to lock {}: {e}", path.display()))),
    }
}

/// Take the lock only if nobody else holds it.
pub fn try_acquire_lock(entry_dir: &Path) -> Result<Option<EntryLock>> {
    let (file, path) = open_lock_file(entry_dir)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(Some(EntryLock { _lock: lock, path })),
        Err((_file, e)) if e == Errno::EWOULDBLOCK => Ok(None),
        Err((_file, e)) => Err(SyncError::Lock(format!("failed to lock {}: {e}", path.display()))),
    }
}

fn open_lock_file(entry_dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(entry_dir)?;
    let path = entry_dir.join(LOCK_FILENAME);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    Ok((file, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let entry_dir = temp_dir.path().join("entry");

        let lock = acquire_lock(&entry_dir)?;
        assert_eq!(lock.path(), entry_dir.join(LOCK_FILENAME));
        assert!(lock.path().exists());
        Ok(())
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let lock = acquire_lock(temp_dir.path())?;
        assert!(try_acquire_lock(temp_dir.path())?.is_none());

        drop(lock);
        assert!(try_acquire_lock(temp_dir.path())?.is_some());
        Ok(())
    }

    #[test]
    fn test_lock_released_on_panic() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().to_path_buf();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _lock = acquire_lock(&dir).unwrap();
            panic!("populating the entry failed");
        }));
        assert!(result.is_err());

        assert!(try_acquire_lock(temp_dir.path())?.is_some());
        Ok(())
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().to_path_buf();

        let lock = acquire_lock(&dir)?;
        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let _lock = acquire_lock(&dir).unwrap();
            tx.send(()).unwrap();
        });

        // Still blocked while we hold the lock
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(lock);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        waiter.join().unwrap();
        Ok(())
    }
}
