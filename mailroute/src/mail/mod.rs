//! Message envelope and decoding.
//!
//! The router only needs the envelope and the raw bytes. Decoding into
//! headers and body goes through mailparse and is used by handlers, the
//! queue receiver and `cleanse`.

pub mod cleanse;
pub mod parser;
pub mod request;

pub use cleanse::cleanse;
pub use parser::{envelope_from_headers, parse_raw_email, ParsedEmail};
pub use request::MailRequest;
