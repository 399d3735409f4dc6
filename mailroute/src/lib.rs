//! Mailroute - stateful mail routing.
//!
//! Inbound messages are dispatched by recipient address and by the sender's
//! conversation state to registered handlers. Anything that resolves nowhere
//! is parked in an undeliverable queue instead of being lost.
//!
//! Binaries:
//! - `mailroute`: admin CLI (routing report, queue inspection, cleanse)
//! - `mailroute-web`: HTTP intake transport
//! - `mailroute-receiver`: drains a spool queue through the router
//!
//! ## Architecture
//!
//! ```text
//! HTTP intake ─┐
//!              ├─▶ Router ──▶ Handler ──▶ next state
//! Spool queue ─┘      └──no match──▶ Undeliverable queue
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod queue;
pub mod receiver;
pub mod routing;
pub mod signal;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{DeliverError, PatternError, QueueError, RouteConfigError, RouteError};
pub use mail::MailRequest;
pub use queue::{QueueStore, UndeliverableSink};
pub use receiver::{QueueReceiver, Received};
pub use routing::{handler_fn, load_router, Delivery, Handler, Router, START_STATE};
pub use web::AppState;
