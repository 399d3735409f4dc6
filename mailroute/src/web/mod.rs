//! HTTP intake transport.
//!
//! A thin web front end for the router:
//! - `POST /deliver` routes one message (optionally HMAC-signed over the
//!   envelope and body)
//! - `GET /routes?test=ADDR&state=S` returns the routing report as JSON
//! - `GET /health`

pub mod handlers;
pub mod signature;

use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use handlers::{
    deliver, health, routes, AppState, DeliverResponse, HealthResponse, IntakePayload, RoutesQuery,
};
pub use signature::{message_digest, sign, signing_enabled, verify_signature, SignedFields};

/// Build the intake application.
pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/deliver", post(deliver))
        .route("/routes", get(routes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
