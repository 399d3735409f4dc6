//! Spool receiver.
//!
//! Drains a spool queue through the router, oldest message first. Spooled
//! messages carry no SMTP envelope, so sender and recipient come from the
//! From/To headers. The loop:
//!
//! 1. Pops one message on the blocking pool
//! 2. Delivers it, logging the outcome
//! 3. Sleeps for the poll interval when the spool is empty
//! 4. Stops when the shutdown future completes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::DeliverError;
use crate::mail::{envelope_from_headers, MailRequest};
use crate::queue::QueueStore;
use crate::routing::{Delivery, Router};

/// What happened to one spooled message.
#[derive(Debug)]
pub enum Received {
    /// Routed to a handler or to the undeliverable sink.
    Routed { key: String, delivery: Delivery },
    /// Headers carried no usable From/To; parked in the undeliverable sink.
    Unaddressed { key: String, queue_key: String },
    /// The handler failed. The message has been consumed.
    Failed { key: String, error: String },
}

#[derive(Clone)]
pub struct QueueReceiver {
    router: Arc<Router>,
    spool: Arc<QueueStore>,
    poll_interval: Duration,
}

impl QueueReceiver {
    pub fn new(router: Arc<Router>, spool: QueueStore, poll_interval: Duration) -> Self {
        Self {
            router,
            spool: Arc::new(spool),
            poll_interval,
        }
    }

    /// Pop and deliver one message. `None` when the spool is empty.
    ///
    /// Only storage faults are returned as errors; handler failures are
    /// reported as [`Received::Failed`]. When the undeliverable sink cannot
    /// take a message it is pushed back onto the spool before the error is
    /// returned, so it is retried on a later pass.
    pub fn process_next(&self) -> Result<Option<Received>> {
        let Some((key, blob)) = self.spool.pop()? else {
            return Ok(None);
        };

        let (sender, recipient) = match envelope_from_headers(&blob) {
            Ok(envelope) => envelope,
            Err(e) => {
                let queue_key = match self.router.undeliverable().push(&blob) {
                    Ok(queue_key) => queue_key,
                    Err(sink_err) => return Err(self.requeue(&key, &blob, sink_err.into())),
                };
                warn!(key = %key, queue_key = %queue_key, error = %e, "receiver_message_unaddressed");
                return Ok(Some(Received::Unaddressed { key, queue_key }));
            }
        };

        let request = MailRequest::new(sender, recipient, blob);
        match self.router.deliver(&request) {
            Ok(delivery) => {
                info!(
                    key = %key,
                    sender = %request.sender,
                    recipient = %request.recipient,
                    no_match = delivery.is_no_match(),
                    "receiver_message_routed"
                );
                Ok(Some(Received::Routed { key, delivery }))
            }
            Err(DeliverError::Handler { handler, source }) => {
                error!(
                    key = %key,
                    sender = %request.sender,
                    recipient = %request.recipient,
                    handler = %handler,
                    error = %format!("{source:#}"),
                    "receiver_handler_failed"
                );
                Ok(Some(Received::Failed {
                    key,
                    error: format!("{source:#}"),
                }))
            }
            Err(e @ DeliverError::Queue(_)) => Err(self.requeue(&key, &request.data, e.into())),
        }
    }

    /// Put a claimed message back on the spool after `cause`, returning the
    /// error to report.
    fn requeue(&self, key: &str, blob: &[u8], cause: anyhow::Error) -> anyhow::Error {
        match self.spool.push(blob) {
            Ok(new_key) => {
                warn!(key = %key, new_key = %new_key, error = %format!("{cause:#}"), "receiver_message_requeued");
                cause.context(format!("Spool message {key} requeued as {new_key}"))
            }
            Err(push_err) => {
                error!(key = %key, error = %push_err, "receiver_requeue_failed");
                cause.context(format!("Spool message {key} could not be requeued: {push_err}"))
            }
        }
    }

    /// Drain the spool until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            spool = %self.spool.dir().display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "receiver_started"
        );

        loop {
            let receiver = self.clone();
            let step = tokio::task::spawn_blocking(move || receiver.process_next())
                .await
                .context("Receiver task panicked")?;

            let idle = match step {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "receiver_spool_error");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = sleep(self.poll_interval) => {}
                }
            } else {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = std::future::ready(()) => {}
                }
            }
        }

        info!("receiver_shutdown_complete");
        Ok(())
    }
}
