//! Error types shared by the routing and queue subsystems.
//!
//! Startup problems (bad patterns, unreadable routes files) are separate from
//! per-message failures so callers can abort initialization on the former and
//! apply their own retry policy to the latter.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`QueueStore`](crate::queue::QueueStore).
#[derive(Debug, Error)]
pub enum QueueError {
    /// No item is stored under the key.
    #[error("queue item not found: {0}")]
    NotFound(String),

    /// The key contains characters that cannot appear in a path segment.
    #[error("invalid queue key: {0:?}")]
    InvalidKey(String),

    /// The storage layer failed (disk full, permission denied, ...).
    #[error("queue I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound(_))
    }
}

/// An address pattern that failed to compile.
#[derive(Debug, Error)]
#[error("invalid address pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Errors raised while registering a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    /// A handler is already registered for this pattern and state.
    #[error("route {pattern:?} already has a handler for state {state}")]
    Duplicate { pattern: String, state: String },
}

/// Errors surfaced by [`Router::deliver`](crate::routing::Router::deliver).
#[derive(Debug, Error)]
pub enum DeliverError {
    /// The selected handler failed. The source is the handler's own error.
    #[error("handler {handler} failed: {source:#}")]
    Handler {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    /// Writing an unroutable message to the undeliverable sink failed.
    #[error("undeliverable sink: {0}")]
    Queue(#[from] QueueError),
}

/// Errors raised while loading a routes file.
#[derive(Debug, Error)]
pub enum RouteConfigError {
    #[error("failed to read routes file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse routes file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("route #{index}: unknown handler kind {kind:?}")]
    UnknownHandler { index: usize, kind: String },

    #[error("route #{index}: handler \"queue\" requires queue_dir")]
    MissingQueueDir { index: usize },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
