//! Store lock file.
//!
//! File-backed stores take an exclusive advisory lock on a `.lock` sibling
//! of the database file. The store is single-writer; a second process
//! opening the same store fails fast with [`StoreError::Locked`] instead of
//! corrupting WAL assumptions.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Holds the exclusive lock for the lifetime of the store.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquires the lock for the database at `db_path`, failing immediately
    /// if another process holds it.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = lock_path(db_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::Connection(format!("failed to create lock file: {e}")))?;

        file.try_lock_exclusive().map_err(|_| StoreError::Locked)?;
        debug!(?path, "store lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            debug!(path = ?self.path, error = %e, "failed to release store lock");
        }
    }
}

/// The lock file path for a database file.
fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "issues.db".to_owned());
    name.push_str(".lock");
    db_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_is_sibling() {
        let p = lock_path(Path::new("/tmp/store/issues.db"));
        assert_eq!(p, Path::new("/tmp/store/issues.db.lock"));
    }

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("issues.db");

        let lock = StoreLock::acquire(&db).unwrap();
        // A second acquisition through an independent handle fails.
        assert!(matches!(StoreLock::acquire(&db), Err(StoreError::Locked)));

        drop(lock);
        // Released: can be taken again.
        StoreLock::acquire(&db).unwrap();
    }
}
