//! The unit of work handed to the router by a transport.

use anyhow::Result;

use super::parser::{parse_raw_email, ParsedEmail};

/// A raw message plus its SMTP envelope.
///
/// The envelope addresses drive routing; the raw bytes are never modified and
/// are what lands in a queue if the message is parked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRequest {
    /// Envelope sender (`MAIL FROM`)
    pub sender: String,
    /// Envelope recipient (`RCPT TO`)
    pub recipient: String,
    /// Raw RFC 5322 message
    pub data: Vec<u8>,
}

impl MailRequest {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            data: data.into(),
        }
    }

    /// Decode the raw bytes into headers and body.
    pub fn parse(&self) -> Result<ParsedEmail> {
        parse_raw_email(&self.data)
    }
}
