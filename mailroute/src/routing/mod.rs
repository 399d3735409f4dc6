//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Transport (sender, recipient, raw bytes)
//!     → router.rs (conversation key → state)
//!     → table.rs (patterns in routing order)
//!     → matcher.rs (anchored regex, named captures)
//!     → Handler::handle → next state → state.rs
//!     or → UndeliverableSink when nothing resolves
//!
//! Route registration (at startup):
//!     config.rs (routes.toml) or Router::add_route
//!     → compile pattern
//!     → append to routing order if new
//! ```

pub mod config;
pub mod handler;
pub mod matcher;
pub mod report;
pub mod router;
pub mod state;
pub mod table;

pub use config::{inspect_router, load_router, load_routes, RouteSpec, RoutesFile};
pub use handler::{handler_fn, FnHandler, Handler};
pub use matcher::{AddressPattern, Captures};
pub use report::{AddressTest, PatternMatch, RouteReport, TableRow};
pub use router::{Delivery, Resolved, Router};
pub use state::{conversation_key, StateStore, START_STATE};
pub use table::{RouteEntry, RoutingTable};
