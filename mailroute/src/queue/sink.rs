//! Fallback destination for messages no route accepts.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::store::QueueStore;
use crate::error::QueueError;

/// Default directory of the undeliverable sink.
pub const DEFAULT_UNDELIVERABLE_DIR: &str = "run/undeliverable";

/// A queue store that only ever receives unroutable messages.
#[derive(Debug, Clone)]
pub struct UndeliverableSink {
    store: QueueStore,
}

impl UndeliverableSink {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        Ok(Self {
            store: QueueStore::open(dir)?,
        })
    }

    /// Park a message verbatim and return its key.
    pub fn push(&self, blob: &[u8]) -> Result<String, QueueError> {
        let key = self.store.push(blob)?;
        warn!(queue = %self.store.dir().display(), key = %key, size = blob.len(), "undeliverable_stored");
        Ok(key)
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// The underlying store, for inspection and draining.
    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}

impl From<QueueStore> for UndeliverableSink {
    fn from(store: QueueStore) -> Self {
        Self { store }
    }
}
