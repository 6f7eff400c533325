use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::fs::SFS;
use crate::io::BlockStorage;

/// A file system handle that can be shared between threads.
///
/// Read-only operations go through [`SharedFs::read`], anything that mutates the inode
/// table, a directory block or the bitmaps goes through [`SharedFs::write`], which keeps
/// every other caller out for the whole operation.
pub struct SharedFs<T: BlockStorage> {
    inner: Arc<RwLock<SFS<T>>>,
}

impl<T: BlockStorage> SharedFs<T> {
    pub fn new(fs: SFS<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(fs)),
        }
    }

    /// Shared access for `resolve`, `read`, `stat`, `readdir` and `statfs`.
    pub fn read(&self) -> RwLockReadGuard<'_, SFS<T>> {
        // Failed operations leave the engine consistent, a panic elsewhere does not
        // make it unusable.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for every mutating operation.
    pub fn write(&self) -> RwLockWriteGuard<'_, SFS<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the file system once no other handle is left.
    pub fn try_unwrap(self) -> Result<SFS<T>, Self> {
        Arc::try_unwrap(self.inner)
            .map(|lock| lock.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|inner| Self { inner })
    }
}

impl<T: BlockStorage> Clone for SharedFs<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
