//! Routes file loading.
//!
//! ```toml
//! [defaults]
//! to = ".+"
//! host = ".+"
//!
//! [[route]]
//! pattern = "(to)@(host)"
//! handler = "log"
//!
//! [[route]]
//! pattern = "^relay-(?P<to>.+)@(?P<host>.+)$"
//! state = "START"
//! handler = "queue"
//! queue_dir = "run/relay"
//! next_state = "RELAYED"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::handler::Handler;
use super::router::Router;
use super::state::START_STATE;
use crate::error::{QueueError, RouteConfigError};
use crate::handlers::log::LOG_HANDLER;
use crate::handlers::queue::QUEUE_HANDLER;
use crate::handlers::{LogHandler, QueueHandler};
use crate::queue::{QueueStore, UndeliverableSink};

#[derive(Debug, Default, Deserialize)]
pub struct RoutesFile {
    /// Placeholder name → regex used to expand `(name)` in patterns
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub route: Vec<RouteSpec>,
}

#[derive(Debug, Deserialize)]
pub struct RouteSpec {
    pub pattern: String,
    #[serde(default = "default_state")]
    pub state: String,
    pub handler: String,
    #[serde(default)]
    pub next_state: Option<String>,
    #[serde(default)]
    pub queue_dir: Option<PathBuf>,
}

fn default_state() -> String {
    START_STATE.to_string()
}

impl RoutesFile {
    pub fn from_path(path: &Path) -> Result<Self, RouteConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| RouteConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| RouteConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

type OpenQueue = fn(&Path) -> Result<QueueStore, QueueError>;

/// Register every route in `routes` on `router`. Returns the number added.
pub fn load_routes(router: &Router, routes: &RoutesFile) -> Result<usize, RouteConfigError> {
    register_routes(router, routes, |dir| QueueStore::open(dir))
}

/// Build a router from a routes file, with its sink at `undeliverable_dir`.
pub fn load_router(routes_file: &Path, undeliverable_dir: &Path) -> Result<Router, RouteConfigError> {
    let routes = RoutesFile::from_path(routes_file)?;
    let router = Router::new(UndeliverableSink::open(undeliverable_dir)?);
    load_routes(&router, &routes)?;
    Ok(router)
}

/// Like [`load_router`], but creates no queue directories. Meant for
/// reporting; delivering through the result fails if a queue is missing.
pub fn inspect_router(routes_file: &Path, undeliverable_dir: &Path) -> Result<Router, RouteConfigError> {
    let routes = RoutesFile::from_path(routes_file)?;
    let router = Router::new(UndeliverableSink::from(QueueStore::bind(undeliverable_dir)));
    register_routes(&router, &routes, |dir| Ok(QueueStore::bind(dir)))?;
    Ok(router)
}

fn register_routes(
    router: &Router,
    routes: &RoutesFile,
    open: OpenQueue,
) -> Result<usize, RouteConfigError> {
    for (index, spec) in routes.route.iter().enumerate() {
        let handler = build_handler(index, spec, open)?;
        router.add_route_with_defaults(&spec.pattern, &routes.defaults, &spec.state, handler)?;
    }

    info!(routes = routes.route.len(), "routes_loaded");
    Ok(routes.route.len())
}

fn build_handler(
    index: usize,
    spec: &RouteSpec,
    open: OpenQueue,
) -> Result<Arc<dyn Handler>, RouteConfigError> {
    let next_state = spec.next_state.clone();

    match spec.handler.as_str() {
        LOG_HANDLER => Ok(Arc::new(LogHandler::new(next_state))),
        QUEUE_HANDLER => {
            let dir = spec
                .queue_dir
                .as_ref()
                .ok_or(RouteConfigError::MissingQueueDir { index })?;
            Ok(Arc::new(QueueHandler::new(open(dir)?, next_state)))
        }
        other => Err(RouteConfigError::UnknownHandler {
            index,
            kind: other.to_string(),
        }),
    }
}
