//! Durable directory-backed blob queue.
//!
//! Layout of a queue directory:
//!
//! ```text
//! <dir>/
//!   tmp/        in-flight writes, never visible to readers
//!   new/<key>   published items, one file per key
//! ```
//!
//! `push` writes and fsyncs a `tempfile` in `tmp/` and then persists it into
//! `new/` without clobbering, so a crash leaves either nothing or a complete
//! item. A failed write removes its temp file when it is dropped. `pop` reads an item and
//! then unlinks it; only one concurrent unlink can succeed, so two poppers
//! never both claim the same item, even across processes.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::key::{generate_key, is_valid_key};
use crate::error::QueueError;

const TMP_DIR: &str = "tmp";
const NEW_DIR: &str = "new";

type Result<T> = std::result::Result<T, QueueError>;

/// A queue of opaque blobs bound to one directory.
#[derive(Debug, Clone)]
pub struct QueueStore {
    dir: PathBuf,
    pop_limit: Option<u64>,
    oversize: Option<Box<QueueStore>>,
    /// Over-limit keys already reported, so polling does not repeat the warning
    skipped: Arc<Mutex<HashSet<String>>>,
}

impl QueueStore {
    /// Open (creating if needed) the queue rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        for sub in [TMP_DIR, NEW_DIR] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }

        Ok(Self::bind(dir))
    }

    /// Refer to the queue at `dir` without touching the filesystem.
    ///
    /// Reads of a missing directory fail with `Io`; use [`open`](Self::open)
    /// for a queue that will be written.
    pub fn bind(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pop_limit: None,
            oversize: None,
            skipped: Arc::default(),
        }
    }

    /// Make `pop` skip items larger than `limit` bytes. Skipped items are moved
    /// to `oversize` when given, otherwise left where they are.
    pub fn with_pop_limit(mut self, limit: u64, oversize: Option<QueueStore>) -> Self {
        self.pop_limit = Some(limit);
        self.oversize = oversize.map(Box::new);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably store `blob` and return its new key.
    pub fn push(&self, blob: &[u8]) -> Result<String> {
        let key = generate_key();
        let tmp_dir = self.dir.join(TMP_DIR);
        let new_path = self.item_path(&key);

        let mut tmp = NamedTempFile::new_in(&tmp_dir).map_err(io_error(&tmp_dir))?;
        tmp.write_all(blob)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(io_error(tmp.path()))?;
        tmp.persist_noclobber(&new_path)
            .map_err(|e| io_error(&new_path)(e.error))?;
        sync_dir(&self.dir.join(NEW_DIR));

        debug!(queue = %self.dir.display(), key = %key, size = blob.len(), "queue_push");
        Ok(key)
    }

    /// Read an item without removing it.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.checked_path(key)?;
        fs::read(&path).map_err(|e| not_found_or_io(key, &path, e))
    }

    /// Remove and return the oldest item, or `None` when the queue is empty.
    pub fn pop(&self) -> Result<Option<(String, Vec<u8>)>> {
        for key in self.keys()? {
            let path = self.item_path(&key);

            if let Some(limit) = self.pop_limit {
                let size = match fs::metadata(&path) {
                    Ok(meta) => meta.len(),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(io_error(&path)(e)),
                };
                if size > limit {
                    self.set_aside(&key, size, limit)?;
                    continue;
                }
            }

            let blob = match fs::read(&path) {
                Ok(blob) => blob,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&path)(e)),
            };

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(queue = %self.dir.display(), key = %key, "queue_pop");
                    return Ok(Some((key, blob)));
                }
                // Another popper claimed it first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&path)(e)),
            }
        }

        Ok(None)
    }

    /// Delete one item. A missing key is reported as `NotFound`.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.checked_path(key)?;
        fs::remove_file(&path).map_err(|e| not_found_or_io(key, &path, e))?;
        debug!(queue = %self.dir.display(), key = %key, "queue_remove");
        Ok(())
    }

    /// Delete every item and return how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;

        for key in self.keys()? {
            match self.remove(&key) {
                Ok(()) => removed += 1,
                Err(QueueError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!(queue = %self.dir.display(), removed = removed, "queue_cleared");
        Ok(removed)
    }

    /// Keys of all stored items, oldest first.
    pub fn keys(&self) -> Result<Vec<String>> {
        let new_dir = self.dir.join(NEW_DIR);
        let entries = fs::read_dir(&new_dir).map_err(io_error(&new_dir))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&new_dir))?;
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_key(name) {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Remove temporary files older than `max_age`, left behind by writers
    /// that died between write and publish.
    pub fn clean_stale(&self, max_age: Duration) -> Result<usize> {
        let tmp_dir = self.dir.join(TMP_DIR);
        let entries = fs::read_dir(&tmp_dir).map_err(io_error(&tmp_dir))?;
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries {
            let entry = entry.map_err(io_error(&tmp_dir))?;
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };

            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            warn!(queue = %self.dir.display(), removed = removed, "queue_stale_tmp_removed");
        }
        Ok(removed)
    }

    fn set_aside(&self, key: &str, size: u64, limit: u64) -> Result<()> {
        let Some(oversize) = &self.oversize else {
            if self.first_skip(key) {
                warn!(queue = %self.dir.display(), key = %key, size = size, limit = limit, "queue_item_oversize_skipped");
            } else {
                debug!(queue = %self.dir.display(), key = %key, "queue_item_oversize_skipped");
            }
            return Ok(());
        };

        let from = self.item_path(key);
        let to = oversize.item_path(key);
        match fs::rename(&from, &to) {
            Ok(()) => {
                warn!(
                    queue = %self.dir.display(),
                    oversize_queue = %oversize.dir.display(),
                    key = %key,
                    size = size,
                    limit = limit,
                    "queue_item_oversize_moved"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&to)(e)),
        }
    }

    /// True the first time `key` is skipped by this store (and its clones).
    fn first_skip(&self, key: &str) -> bool {
        self.skipped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(NEW_DIR).join(key)
    }

    fn checked_path(&self, key: &str) -> Result<PathBuf> {
        if is_valid_key(key) {
            Ok(self.item_path(key))
        } else {
            Err(QueueError::InvalidKey(key.to_string()))
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "queue_dir_sync_failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> QueueError + '_ {
    move |source| QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn not_found_or_io(key: &str, path: &Path, e: io::Error) -> QueueError {
    if e.kind() == io::ErrorKind::NotFound {
        QueueError::NotFound(key.to_string())
    } else {
        io_error(path)(e)
    }
}
