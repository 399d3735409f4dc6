//! RFC 5322 message decoding using mailparse.
//!
//! Decoding is a black box to the router: handlers call it when they need
//! headers or a body, the queue receiver calls it to recover an envelope
//! from a spooled message, and `cleanse` uses it to validate queues.

use anyhow::{anyhow, Context, Result};
use mailparse::{addrparse_header, parse_mail, MailAddr, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

/// Decoded view of a message.
#[derive(Debug, Default)]
pub struct ParsedEmail {
    /// Message-Id header value (without angle brackets)
    pub message_id: Option<String>,
    /// First address of the From header
    pub from: Option<String>,
    /// First address of the To header
    pub to: Option<String>,
    /// Subject header value
    pub subject: Option<String>,
    /// First text/plain body, or the top-level body for single-part messages
    pub body: Option<String>,
}

/// Parse raw RFC 5322 content.
pub fn parse_raw_email(raw: &[u8]) -> Result<ParsedEmail> {
    let mail = parse_mail(raw).context("Failed to parse email")?;

    let message_id = mail
        .headers
        .get_first_value("Message-Id")
        .map(|id| id.trim().trim_matches(|c| c == '<' || c == '>').to_string());

    let subject = mail.headers.get_first_value("Subject");
    let from = first_address(&mail, "From");
    let to = first_address(&mail, "To");
    let body = extract_text_body(&mail);

    debug!(
        message_id = ?message_id,
        from = ?from,
        to = ?to,
        has_body = body.is_some(),
        "email_parse_complete"
    );

    Ok(ParsedEmail {
        message_id,
        from,
        to,
        subject,
        body,
    })
}

/// Recover `(sender, recipient)` from the From/To headers of a raw message.
///
/// Used when a message arrives without an SMTP envelope, e.g. from a spool.
pub fn envelope_from_headers(raw: &[u8]) -> Result<(String, String)> {
    let parsed = parse_raw_email(raw)?;
    let sender = parsed.from.ok_or_else(|| anyhow!("message has no From address"))?;
    let recipient = parsed.to.ok_or_else(|| anyhow!("message has no To address"))?;
    Ok((sender, recipient))
}

fn first_address(mail: &ParsedMail, header: &str) -> Option<String> {
    let header = mail.headers.get_first_header(header)?;

    let list = match addrparse_header(header) {
        Ok(list) => list,
        Err(e) => {
            warn!(header = %header.get_key(), error = %e, "email_address_parse_failed");
            return None;
        }
    };

    list.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
    })
}

/// Find the first text/plain part, descending into multiparts.
fn extract_text_body(mail: &ParsedMail) -> Option<String> {
    let content_type = mail.ctype.mimetype.as_str();

    if content_type.starts_with("multipart/") {
        return mail.subparts.iter().find_map(extract_text_body);
    }

    if content_type.starts_with("text/") {
        return match mail.get_body() {
            Ok(body) if !body.trim().is_empty() => Some(body),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "email_body_extraction_failed");
                None
            }
        };
    }

    None
}
