//! Built-in handlers.
//!
//! - `log`: record the message and leave it at that
//! - `queue`: park the raw message in a named queue for later draining

pub mod log;
pub mod queue;

pub use log::LogHandler;
pub use queue::QueueHandler;
