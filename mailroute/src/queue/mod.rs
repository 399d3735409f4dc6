//! Durable on-disk queues.
//!
//! A queue is a directory of files, one per message, keyed by a generated,
//! time-sortable identifier. There is no index: enumeration is a directory
//! listing, and crash safety comes from write-then-rename.
//!
//! ## Layout
//!
//! ```text
//! Router ──no match──▶ UndeliverableSink ─┐
//! Handlers ───push──▶ named QueueStore ───┼─▶ <dir>/new/<key>
//! Receiver ◀──pop─── spool QueueStore ────┘
//! ```

pub mod key;
pub mod sink;
pub mod store;

pub use key::{generate_key, is_valid_key};
pub use sink::{UndeliverableSink, DEFAULT_UNDELIVERABLE_DIR};
pub use store::QueueStore;
