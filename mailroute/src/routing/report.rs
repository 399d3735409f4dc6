//! Routing introspection.
//!
//! Renders the routing order, the routing table and, optionally, how one
//! test address resolves. The same report backs the `routes` CLI command and
//! the `/routes` HTTP endpoint.

use std::fmt;

use serde::Serialize;

use super::matcher::Captures;
use super::router::Router;

#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    /// Patterns in match order
    pub order: Vec<String>,
    /// Pattern → `handler.STATE` labels
    pub table: Vec<TableRow>,
    /// Result of testing one address, if requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<AddressTest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub pattern: String,
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressTest {
    pub address: String,
    pub state: String,
    /// Every pattern the address matches, in routing order
    pub matches: Vec<PatternMatch>,
    /// The `handler.STATE` that `deliver` would pick, if any
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub handlers: Vec<String>,
    pub captures: Captures,
}

impl AddressTest {
    pub fn matched(&self) -> bool {
        !self.matches.is_empty()
    }
}

impl Router {
    /// Build a report, testing `address` in `state` when given.
    pub fn report(&self, test: Option<(&str, &str)>) -> RouteReport {
        let table = self.read_table();

        let rows: Vec<TableRow> = table
            .order()
            .iter()
            .map(|pattern| TableRow {
                pattern: pattern.as_str().to_string(),
                handlers: table.entries(pattern.as_str()).iter().map(|e| e.label()).collect(),
            })
            .collect();

        let test = test.map(|(address, state)| {
            let matches = table
                .order()
                .iter()
                .filter_map(|pattern| {
                    let captures = pattern.matches(address)?;
                    Some(PatternMatch {
                        pattern: pattern.as_str().to_string(),
                        handlers: table.entries(pattern.as_str()).iter().map(|e| e.label()).collect(),
                        captures,
                    })
                })
                .collect::<Vec<_>>();

            let resolved = matches.iter().find_map(|m| {
                table.lookup(&m.pattern, state).map(|e| e.label())
            });

            AddressTest {
                address: address.to_string(),
                state: state.to_string(),
                matches,
                resolved,
            }
        });

        RouteReport {
            order: rows.iter().map(|r| r.pattern.clone()).collect(),
            table: rows,
            test,
        }
    }
}

impl fmt::Display for RouteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order: Vec<String> = self.order.iter().map(|p| format!("'{}'", p)).collect();
        writeln!(f, "Routing ORDER: [{}]", order.join(", "))?;
        writeln!(f, "Routing TABLE:")?;
        writeln!(f, "---")?;
        for row in &self.table {
            writeln!(f, "'{}': {}", row.pattern, row.handlers.join(" "))?;
        }
        writeln!(f, "---")?;

        let Some(test) = &self.test else {
            return Ok(());
        };

        writeln!(f)?;
        if !test.matched() {
            return writeln!(f, "TEST address '{}' didn't match anything.", test.address);
        }

        writeln!(f, "TEST address '{}' matches:", test.address)?;
        for m in &test.matches {
            writeln!(f, "  '{}' {}", m.pattern, m.handlers.join(" "))?;
            writeln!(f, "  -  {:?}", m.captures)?;
        }
        match &test.resolved {
            Some(label) => writeln!(f, "RESOLVES in state {} to {}", test.state, label),
            None => writeln!(f, "RESOLVES in state {} to nothing", test.state),
        }
    }
}
