//! Intake endpoint handlers.
//!
//! `/deliver` is a transport: it hands one message plus envelope to the
//! router and reports the outcome. Routing runs on the blocking pool since
//! handlers and queues do synchronous file I/O.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::DeliverError;
use crate::mail::MailRequest;
use crate::routing::{Delivery, RouteReport, Router, START_STATE};
use crate::web::signature::{message_digest, signing_enabled, verify_signature, SignedFields};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<Router>,
}

impl AppState {
    pub fn new(config: Config, router: Arc<Router>) -> Self {
        Self {
            config: Arc::new(config),
            router,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Delivery
// =============================================================================

/// One inbound message with its envelope.
///
/// The message goes in exactly one of `raw` (UTF-8 text) or `raw_base64`
/// (any bytes, e.g. 8-bit bodies).
#[derive(Debug, Deserialize)]
pub struct IntakePayload {
    pub sender: String,
    pub recipient: String,
    /// Raw RFC 5322 message as text
    #[serde(default)]
    pub raw: Option<String>,
    /// Raw RFC 5322 message, standard base64
    #[serde(default)]
    pub raw_base64: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub signature: String,
}

impl IntakePayload {
    /// The message bytes, from whichever field carries them.
    pub fn message_bytes(&self) -> Result<Vec<u8>, String> {
        match (&self.raw, &self.raw_base64) {
            (Some(raw), None) => Ok(raw.clone().into_bytes()),
            (None, Some(encoded)) => B64
                .decode(encoded.trim())
                .map_err(|e| format!("raw_base64 is not valid base64: {e}")),
            (Some(_), Some(_)) => Err("send only one of raw and raw_base64".to_string()),
            (None, None) => Err("missing raw or raw_base64".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliverResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub queue_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl DeliverResponse {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            handler: None,
            next_state: None,
            queue_key: None,
            error: None,
        }
    }
}

/// Route one message.
///
/// - 200 `delivered`: a handler accepted it
/// - 202 `no_match`: stored in the undeliverable sink
/// - 400 `bad_request`: no usable message body
/// - 401 `unauthorized`: signature checks failed
/// - 500 `error`: the handler or the sink failed
pub async fn deliver(
    State(state): State<AppState>,
    Json(payload): Json<IntakePayload>,
) -> impl IntoResponse {
    let data = match payload.message_bytes() {
        Ok(data) => data,
        Err(reason) => {
            warn!(sender = %payload.sender, reason = %reason, "intake_body_invalid");
            return (
                StatusCode::BAD_REQUEST,
                Json(DeliverResponse {
                    error: Some(reason),
                    ..DeliverResponse::status("bad_request")
                }),
            );
        }
    };

    info!(
        sender = %payload.sender,
        recipient = %payload.recipient,
        raw_length = data.len(),
        has_signature = !payload.signature.is_empty(),
        "intake_received"
    );

    let signing_key = state.config.intake_signing_key.as_deref();
    if let Some(key) = signing_key.filter(|k| signing_enabled(Some(k))) {
        let fields = SignedFields {
            timestamp: &payload.timestamp,
            token: &payload.token,
            signature: &payload.signature,
        };
        let digest = message_digest(&payload.sender, &payload.recipient, &data);
        if !verify_signature(key, fields, &digest, state.config.intake_signature_max_age) {
            warn!(sender = %payload.sender, "intake_signature_invalid");
            return (
                StatusCode::UNAUTHORIZED,
                Json(DeliverResponse::status("unauthorized")),
            );
        }
    }

    let request = MailRequest::new(payload.sender, payload.recipient, data);
    let router = Arc::clone(&state.router);
    let outcome = tokio::task::spawn_blocking(move || router.deliver(&request)).await;

    match outcome {
        Ok(Ok(Delivery::Handled {
            handler,
            next_state,
            ..
        })) => (
            StatusCode::OK,
            Json(DeliverResponse {
                handler: Some(handler),
                next_state: Some(next_state),
                ..DeliverResponse::status("delivered")
            }),
        ),
        Ok(Ok(Delivery::NoMatch { queue_key })) => (
            StatusCode::ACCEPTED,
            Json(DeliverResponse {
                queue_key: Some(queue_key),
                ..DeliverResponse::status("no_match")
            }),
        ),
        Ok(Err(e)) => {
            let handler = match &e {
                DeliverError::Handler { handler, .. } => Some(handler.clone()),
                DeliverError::Queue(_) => None,
            };
            error!(error = %e, "intake_deliver_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeliverResponse {
                    handler,
                    error: Some(e.to_string()),
                    ..DeliverResponse::status("error")
                }),
            )
        }
        Err(e) => {
            error!(error = %e, "intake_task_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeliverResponse::status("error")),
            )
        }
    }
}

// =============================================================================
// Introspection
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RoutesQuery {
    /// Address to test against the table
    pub test: Option<String>,
    /// State to test in (default: START)
    pub state: Option<String>,
    /// Use this sender's current conversation state instead of `state`
    pub sender: Option<String>,
}

pub async fn routes(
    State(state): State<AppState>,
    Query(query): Query<RoutesQuery>,
) -> Json<RouteReport> {
    let current = match (&query.sender, query.state) {
        (Some(sender), _) => state.router.state_of(sender),
        (None, Some(explicit)) => explicit,
        (None, None) => START_STATE.to_string(),
    };

    Json(
        state
            .router
            .report(query.test.as_deref().map(|address| (address, current.as_str()))),
    )
}
