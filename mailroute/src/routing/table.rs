//! Routing table and routing order.
//!
//! The table maps each pattern to the handlers registered for it, one per
//! owning state. The order lists each distinct pattern once, in the order it
//! was first registered, and is the order patterns are tried in.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::handler::Handler;
use super::matcher::AddressPattern;
use crate::error::RouteError;

/// One (pattern, state) → handler binding.
#[derive(Clone)]
pub struct RouteEntry {
    pub state: String,
    pub handler: Arc<dyn Handler>,
}

impl RouteEntry {
    /// `handler.STATE`, the form used in route listings.
    pub fn label(&self) -> String {
        format!("{}.{}", self.handler.name(), self.state)
    }
}

#[derive(Default)]
pub struct RoutingTable {
    order: Vec<AddressPattern>,
    entries: HashMap<String, Vec<RouteEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `(pattern, state)`, appending the pattern to the
    /// routing order if it is new.
    pub fn add(
        &mut self,
        pattern: AddressPattern,
        state: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        let key = pattern.as_str().to_string();

        if let Some(entries) = self.entries.get(&key) {
            if entries.iter().any(|e| e.state == state) {
                return Err(RouteError::Duplicate {
                    pattern: key,
                    state: state.to_string(),
                });
            }
        } else {
            self.order.push(pattern);
        }

        self.entries.entry(key).or_default().push(RouteEntry {
            state: state.to_string(),
            handler,
        });

        Ok(())
    }

    /// Handler registered for exactly `(pattern, state)`.
    pub fn lookup(&self, pattern: &str, state: &str) -> Option<&RouteEntry> {
        self.entries.get(pattern)?.iter().find(|e| e.state == state)
    }

    pub fn order(&self) -> &[AddressPattern] {
        &self.order
    }

    /// Entries for a pattern, in registration order.
    pub fn entries(&self, pattern: &str) -> &[RouteEntry] {
        self.entries.get(pattern).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Handler name → every (pattern, state) it serves.
    pub fn registered(&self) -> BTreeMap<String, Vec<(String, String)>> {
        let mut registered: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

        for pattern in &self.order {
            for entry in self.entries(pattern.as_str()) {
                registered
                    .entry(entry.handler.name().to_string())
                    .or_default()
                    .push((pattern.as_str().to_string(), entry.state.clone()));
            }
        }

        registered
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
