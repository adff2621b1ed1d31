//! Named cross-process lock.
//!
//! The lock is an exclusive advisory lock on a file whose name is derived
//! from the account identifier, so unrelated processes that derive the same
//! name contend for the same OS lock. The kernel drops the lock when the
//! holding process exits, including on a crash.
//!
//! File locks are owned by an open file description, not by a thread, so
//! two threads sharing one handle would both "hold" it. An in-process mutex
//! in front of the file lock serializes threads that share a handle.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, warn};

use sched_core::{Error, Result};

/// A handle on a named lock. Not re-entrant: acquiring twice from the same
/// thread deadlocks.
#[derive(Debug)]
pub struct NamedLock {
    path: PathBuf,
    file: Mutex<File>,
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct NamedLockGuard<'a> {
    lock: &'a NamedLock,
    file: MutexGuard<'a, File>,
}

impl NamedLock {
    /// Open (creating if needed) the lock file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::file_io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::file_io(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held.
    pub fn acquire(&self) -> Result<NamedLockGuard<'_>> {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        FileExt::lock_exclusive(&*file).map_err(|e| Error::file_io(&self.path, e))?;
        debug!(lock = %self.path.display(), "acquired named lock");
        Ok(NamedLockGuard { lock: self, file })
    }

    /// Take the lock if nobody else holds it.
    pub fn try_acquire(&self) -> Result<Option<NamedLockGuard<'_>>> {
        let file = match self.file.try_lock() {
            Ok(file) => file,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(None),
        };
        match FileExt::try_lock_exclusive(&*file) {
            Ok(()) => Ok(Some(NamedLockGuard { lock: self, file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(Error::file_io(&self.path, e)),
        }
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&*self.file) {
            warn!(lock = %self.lock.path.display(), error = %e, "failed to release named lock");
        } else {
            debug!(lock = %self.lock.path.display(), "released named lock");
        }
    }
}
