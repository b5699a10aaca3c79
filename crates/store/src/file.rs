//! Locked, atomic persistence of the reference document.
//!
//! Writers take an exclusive `flock` on a sidecar lock file, reload the
//! current document, apply their mutation, write `metadata.json.tmp`,
//! fsync it and rename it over `metadata.json`.  The lock lives on the
//! sidecar rather than on the temp file because the temp file's inode is
//! replaced by every rename.
//!
//! Readers never lock.  The rename is atomic, so a reader sees either the
//! old or the new document; anything unreadable degrades to an empty
//! default.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::document::ReferenceDocument;
use crate::error::StoreError;

/// Document file name under the reference root.
pub const DOCUMENT_FILE: &str = "metadata.json";

/// Handle to the on-disk document and its lock/temp siblings.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
    tmp_path: PathBuf,
    lock_path: PathBuf,
}

impl DocumentFile {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(DOCUMENT_FILE),
            tmp_path: root.join(format!("{DOCUMENT_FILE}.tmp")),
            lock_path: root.join(format!("{DOCUMENT_FILE}.lock")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document, failing soft.
    pub fn load(&self) -> ReferenceDocument {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ReferenceDocument::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Reference document unreadable, using empty store");
                return ReferenceDocument::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Reference document corrupt, using empty store");
                ReferenceDocument::default()
            }
        }
    }

    /// Read-modify-write the document under the exclusive lock.
    ///
    /// The document is only rewritten when `mutate` succeeds and actually
    /// changed it.  Side effects on entity files performed inside `mutate`
    /// happen while the lock is held.
    pub fn update<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut ReferenceDocument) -> Result<T, StoreError>,
    {
        let _lock = FileLock::acquire(&self.lock_path)?;

        let before = self.load();
        let mut doc = before.clone();
        let out = mutate(&mut doc)?;

        if doc != before {
            self.write_atomic(&doc)?;
        }
        Ok(out)
    }

    fn write_atomic(&self, doc: &ReferenceDocument) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(doc)?;

        let mut tmp = File::create(&self.tmp_path).map_err(|e| StoreError::io(&self.tmp_path, e))?;
        tmp.write_all(&body)
            .and_then(|()| tmp.sync_all())
            .map_err(|e| StoreError::io(&self.tmp_path, e))?;
        drop(tmp);

        fs::rename(&self.tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }
}

/// Exclusive advisory lock released on drop.
struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        // Safety: the descriptor belongs to `file`, which outlives the call.
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(StoreError::io(path, io::Error::last_os_error()));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Safety: the descriptor is still open; closing it would also release
        // the lock, this just makes the release explicit.
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if ret != 0 {
            tracing::warn!(path = %self.path.display(), "Failed to release reference document lock");
        }
    }
}
