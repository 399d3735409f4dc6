//! Handler that logs what it receives.

use anyhow::Result;
use tracing::{info, warn};

use crate::mail::MailRequest;
use crate::routing::{Captures, Handler};

pub const LOG_HANDLER: &str = "log";

/// Logs each message with its captures, then moves to `next_state` if set.
#[derive(Debug, Clone, Default)]
pub struct LogHandler {
    next_state: Option<String>,
}

impl LogHandler {
    pub fn new(next_state: Option<String>) -> Self {
        Self { next_state }
    }
}

impl Handler for LogHandler {
    fn name(&self) -> &str {
        LOG_HANDLER
    }

    fn handle(&self, message: &MailRequest, captures: &Captures) -> Result<Option<String>> {
        let (message_id, subject) = match message.parse() {
            Ok(parsed) => (parsed.message_id, parsed.subject),
            Err(e) => {
                warn!(recipient = %message.recipient, error = %e, "log_handler_parse_failed");
                (None, None)
            }
        };

        info!(
            sender = %message.sender,
            recipient = %message.recipient,
            captures = ?captures,
            message_id = ?message_id,
            subject = ?subject,
            size = message.data.len(),
            "log_handler_message"
        );

        Ok(self.next_state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_handler_returns_configured_state() {
        let message = MailRequest::new("a@example.com", "b@example.com", "Subject: hi\r\n\r\nbody");

        assert_eq!(LogHandler::default().handle(&message, &Captures::new()).unwrap(), None);
        assert_eq!(
            LogHandler::new(Some("CONFIRM".to_string()))
                .handle(&message, &Captures::new())
                .unwrap(),
            Some("CONFIRM".to_string())
        );
    }

    #[test]
    fn test_log_handler_tolerates_garbage() {
        let message = MailRequest::new("a@example.com", "b@example.com", vec![0xff, 0xfe, 0x00]);
        assert!(LogHandler::default().handle(&message, &Captures::new()).is_ok());
    }
}
