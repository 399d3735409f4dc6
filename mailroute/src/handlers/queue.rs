//! Handler that parks messages in a queue.

use anyhow::{Context, Result};
use tracing::info;

use crate::mail::MailRequest;
use crate::queue::QueueStore;
use crate::routing::{Captures, Handler};

pub const QUEUE_HANDLER: &str = "queue";

/// Pushes the raw message into `store`, e.g. an outbound relay queue.
#[derive(Debug, Clone)]
pub struct QueueHandler {
    store: QueueStore,
    next_state: Option<String>,
}

impl QueueHandler {
    pub fn new(store: QueueStore, next_state: Option<String>) -> Self {
        Self { store, next_state }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}

impl Handler for QueueHandler {
    fn name(&self) -> &str {
        QUEUE_HANDLER
    }

    fn handle(&self, message: &MailRequest, _captures: &Captures) -> Result<Option<String>> {
        let key = self
            .store
            .push(&message.data)
            .with_context(|| format!("Failed to queue message for {}", message.recipient))?;

        info!(
            queue = %self.store.dir().display(),
            key = %key,
            recipient = %message.recipient,
            "queue_handler_stored"
        );

        Ok(self.next_state.clone())
    }
}
