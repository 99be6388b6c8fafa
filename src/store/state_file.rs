//! Locked read-modify-write cycles against a snapshot file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::lock::{LockError, StateLock};
use super::snapshot::SnapshotError;
use super::FlowStore;

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("state snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Snapshot path plus how long to wait for its lock.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    lock_timeout: Duration,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload `store` from disk, run `f`, then write the store back, all
    /// while holding the snapshot lock.
    ///
    /// Writes made by other processes before the lock was taken are never
    /// overwritten with stale data.
    pub fn locked<R>(&self, store: &FlowStore, f: impl FnOnce() -> R) -> Result<R, StateFileError> {
        let _lock = StateLock::acquire(&self.path, self.lock_timeout)?;
        store.reload(&self.path)?;
        let out = f();
        store.save(&self.path)?;
        Ok(out)
    }
}
