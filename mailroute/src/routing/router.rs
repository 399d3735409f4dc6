//! Message dispatch.
//!
//! # Delivery
//!
//! 1. Derive the conversation key from the envelope sender
//! 2. Look up the conversation state (default `START`)
//! 3. Try patterns in routing order against the recipient
//! 4. The first pattern that matches *and* has a handler for the current
//!    state wins; a matching pattern without one is skipped
//! 5. Run the handler and store the state it returns
//! 6. If nothing resolves, park the message in the undeliverable sink
//!
//! Deliveries for one conversation key run one at a time so state
//! transitions apply in order. Different keys proceed independently.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::handler::Handler;
use super::matcher::{AddressPattern, Captures};
use super::state::{conversation_key, StateStore};
use super::table::RoutingTable;
use crate::error::{DeliverError, RouteError};
use crate::mail::MailRequest;
use crate::queue::UndeliverableSink;

type KeyFn = dyn Fn(&str) -> String + Send + Sync;

/// Outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A handler accepted the message.
    Handled {
        handler: String,
        pattern: String,
        state: String,
        next_state: String,
        captures: Captures,
    },
    /// Nothing matched; the message was stored in the undeliverable sink.
    NoMatch { queue_key: String },
}

impl Delivery {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Delivery::NoMatch { .. })
    }
}

/// The route a recipient resolves to in a given state.
#[derive(Clone)]
pub struct Resolved {
    pub pattern: String,
    pub state: String,
    pub handler: Arc<dyn Handler>,
    pub captures: Captures,
}

/// Routing context: table, conversation state and undeliverable sink.
///
/// Construct one per process and share it (`Arc<Router>`) with transports.
pub struct Router {
    table: RwLock<RoutingTable>,
    states: StateStore,
    undeliverable: UndeliverableSink,
    key_fn: Box<KeyFn>,
}

impl Router {
    pub fn new(undeliverable: UndeliverableSink) -> Self {
        Self {
            table: RwLock::new(RoutingTable::new()),
            states: StateStore::new(),
            undeliverable,
            key_fn: Box::new(conversation_key),
        }
    }

    /// Replace the sender → conversation key derivation.
    pub fn with_conversation_key<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_fn = Box::new(key_fn);
        self
    }

    /// Register `handler` for `pattern` while the conversation is in `state`.
    pub fn add_route(
        &self,
        pattern: &str,
        state: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        let compiled = AddressPattern::new(pattern)?;
        self.register(compiled, state, handler)
    }

    /// Like [`add_route`](Self::add_route), expanding `(name)` placeholders
    /// from `defaults` first.
    pub fn add_route_with_defaults(
        &self,
        template: &str,
        defaults: &BTreeMap<String, String>,
        state: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        let compiled = AddressPattern::with_defaults(template, defaults)?;
        self.register(compiled, state, handler)
    }

    fn register(
        &self,
        pattern: AddressPattern,
        state: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        info!(
            pattern = %pattern,
            state = %state,
            handler = %handler.name(),
            "route_registered"
        );
        self.write_table().add(pattern, state, handler)
    }

    /// Remove every route. Queued messages are not touched.
    pub fn clear_routes(&self) {
        self.write_table().clear();
        info!("routes_cleared");
    }

    /// Reset every conversation to `START`.
    pub fn clear_states(&self) {
        self.states.clear_all();
        info!("states_cleared");
    }

    /// Clear routes and states, for test isolation.
    pub fn reset(&self) {
        self.clear_routes();
        self.clear_states();
    }

    /// Distinct patterns in match order.
    pub fn routing_order(&self) -> Vec<String> {
        self.read_table()
            .order()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    /// Handler name → (pattern, state) pairs it is registered under.
    pub fn registered(&self) -> BTreeMap<String, Vec<(String, String)>> {
        self.read_table().registered()
    }

    /// Current state of the conversation `sender` belongs to.
    pub fn state_of(&self, sender: &str) -> String {
        self.states.get_state(&(self.key_fn)(sender))
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    pub fn undeliverable(&self) -> &UndeliverableSink {
        &self.undeliverable
    }

    /// Find the route `address` takes in `state`, without running it.
    pub fn resolve(&self, address: &str, state: &str) -> Option<Resolved> {
        let table = self.read_table();

        table.order().iter().find_map(|pattern| {
            let captures = pattern.matches(address)?;
            let entry = table.lookup(pattern.as_str(), state)?;
            Some(Resolved {
                pattern: pattern.as_str().to_string(),
                state: state.to_string(),
                handler: Arc::clone(&entry.handler),
                captures,
            })
        })
    }

    /// Deliver one message to the handler its recipient and sender's state
    /// select, or to the undeliverable sink.
    ///
    /// Handler errors are returned unchanged (wrapped with the handler name)
    /// and leave the conversation state as it was.
    pub fn deliver(&self, message: &MailRequest) -> Result<Delivery, DeliverError> {
        let key = (self.key_fn)(&message.sender);

        self.states.with_key_locked(&key, || -> Result<Delivery, DeliverError> {
            let state = self.states.get_state(&key);

            let Some(resolved) = self.resolve(&message.recipient, &state) else {
                let queue_key = self.undeliverable.push(&message.data)?;
                warn!(
                    sender = %message.sender,
                    recipient = %message.recipient,
                    state = %state,
                    queue_key = %queue_key,
                    "router_no_match"
                );
                return Ok(Delivery::NoMatch { queue_key });
            };

            let handler = resolved.handler.name().to_string();
            debug!(
                recipient = %message.recipient,
                pattern = %resolved.pattern,
                state = %state,
                handler = %handler,
                "router_dispatch"
            );

            let next = resolved
                .handler
                .handle(message, &resolved.captures)
                .map_err(|source| DeliverError::Handler {
                    handler: handler.clone(),
                    source,
                })?;

            let next_state = next.unwrap_or_else(|| state.clone());
            self.states.set_state(&key, &next_state);

            info!(
                sender = %message.sender,
                recipient = %message.recipient,
                handler = %handler,
                state = %state,
                next_state = %next_state,
                "router_delivered"
            );

            Ok(Delivery::Handled {
                handler,
                pattern: resolved.pattern,
                state,
                next_state,
                captures: resolved.captures,
            })
        })
    }

    pub(crate) fn read_table(&self) -> RwLockReadGuard<'_, RoutingTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, RoutingTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::handler::handler_fn;
    use crate::routing::state::START_STATE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const ANY_ADDRESS: &str = "^(?P<to>.+)@(?P<host>.+)$";

    fn router() -> (TempDir, Router) {
        let temp = TempDir::new().unwrap();
        let sink = UndeliverableSink::open(temp.path().join("undeliverable")).unwrap();
        (temp, Router::new(sink))
    }

    fn message(sender: &str, recipient: &str) -> MailRequest {
        MailRequest::new(sender, recipient, format!("From: {sender}\r\nTo: {recipient}\r\n\r\nhi"))
    }

    fn counting(name: &str, next: Option<&str>) -> (Arc<AtomicUsize>, Arc<dyn Handler>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let next = next.map(str::to_string);
        let handler = handler_fn(name, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(next.clone())
        });
        (calls, handler)
    }

    #[test]
    fn test_deliver_captures_and_transitions() {
        let (_temp, router) = router();
        let (calls, handler) = counting("app::start", Some("CONFIRM"));
        router.add_route(ANY_ADDRESS, START_STATE, handler).unwrap();

        let outcome = router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        match outcome {
            Delivery::Handled { handler, state, next_state, captures, .. } => {
                assert_eq!(handler, "app::start");
                assert_eq!(state, START_STATE);
                assert_eq!(next_state, "CONFIRM");
                assert_eq!(captures["to"], "user");
                assert_eq!(captures["host"], "example.com");
            }
            other => panic!("expected Handled, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.state_of("alice@example.com"), "CONFIRM");
    }

    #[test]
    fn test_no_handler_for_state_goes_to_sink() {
        let (_temp, router) = router();
        let (_, handler) = counting("app::start", Some("CONFIRM"));
        router.add_route(ANY_ADDRESS, START_STATE, handler).unwrap();

        router.deliver(&message("alice@example.com", "user@example.com")).unwrap();
        let second = router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        assert!(second.is_no_match());
        assert_eq!(router.undeliverable().store().count().unwrap(), 1);
        // Another sender is still at START.
        let other = router.deliver(&message("bob@example.com", "user@example.com")).unwrap();
        assert!(!other.is_no_match());
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let (_temp, router) = router();
        let (first_calls, first) = counting("app::first", None);
        let (second_calls, second) = counting("app::second", None);
        router.add_route("(?P<to>.+)@example\\.com", START_STATE, first).unwrap();
        router.add_route(ANY_ADDRESS, START_STATE, second).unwrap();

        router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_matching_pattern_without_state_entry_falls_through() {
        let (_temp, router) = router();
        let (_, confirm) = counting("app::confirm", None);
        let (catch_calls, catch_all) = counting("app::catch_all", None);
        router.add_route("(?P<to>.+)@example\\.com", "CONFIRM", confirm).unwrap();
        router.add_route(ANY_ADDRESS, START_STATE, catch_all).unwrap();

        let outcome = router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        assert!(matches!(outcome, Delivery::Handled { ref handler, .. } if handler == "app::catch_all"));
        assert_eq!(catch_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_error_keeps_state() {
        let (_temp, router) = router();
        let failing = handler_fn("app::broken", |_, _| Err(anyhow::anyhow!("boom")));
        router.add_route(ANY_ADDRESS, START_STATE, failing).unwrap();

        let err = router.deliver(&message("alice@example.com", "user@example.com")).unwrap_err();

        match err {
            DeliverError::Handler { handler, source } => {
                assert_eq!(handler, "app::broken");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(router.state_of("alice@example.com"), START_STATE);
        assert_eq!(router.undeliverable().store().count().unwrap(), 0);
    }

    #[test]
    fn test_clear_routes_yields_no_match() {
        let (_temp, router) = router();
        let (_, handler) = counting("app::start", None);
        router.add_route(ANY_ADDRESS, START_STATE, handler).unwrap();

        router.clear_routes();
        router.clear_routes();

        let outcome = router.deliver(&message("alice@example.com", "user@example.com")).unwrap();
        assert!(outcome.is_no_match());
        assert!(router.routing_order().is_empty());
    }

    #[test]
    fn test_sink_keeps_message_verbatim() {
        let (_temp, router) = router();
        let request = message("alice@example.com", "nobody@example.com");

        let Delivery::NoMatch { queue_key } = router.deliver(&request).unwrap() else {
            panic!("expected NoMatch");
        };

        assert_eq!(router.undeliverable().store().get(&queue_key).unwrap(), request.data);
    }

    #[test]
    fn test_custom_conversation_key() {
        let temp = TempDir::new().unwrap();
        let sink = UndeliverableSink::open(temp.path().join("sink")).unwrap();
        // Whole domain shares one conversation.
        let router = Router::new(sink).with_conversation_key(|sender| {
            sender.rsplit('@').next().unwrap_or(sender).to_string()
        });
        let (_, handler) = counting("app::start", Some("CONFIRM"));
        router.add_route(ANY_ADDRESS, START_STATE, handler).unwrap();

        router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        assert_eq!(router.state_of("bob@example.com"), "CONFIRM");
        assert_eq!(router.state_of("carol@other.org"), START_STATE);
    }

    #[test]
    fn test_add_route_rejects_bad_pattern() {
        let (_temp, router) = router();
        let (_, handler) = counting("app::start", None);

        let err = router.add_route("(unclosed", START_STATE, handler).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern(_)));
    }

    #[test]
    fn test_reset_clears_both() {
        let (_temp, router) = router();
        let (_, handler) = counting("app::start", Some("CONFIRM"));
        router.add_route(ANY_ADDRESS, START_STATE, handler).unwrap();
        router.deliver(&message("alice@example.com", "user@example.com")).unwrap();

        router.reset();

        assert!(router.registered().is_empty());
        assert_eq!(router.state_of("alice@example.com"), START_STATE);
    }
}
