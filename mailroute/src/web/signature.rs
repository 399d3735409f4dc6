//! Intake request signature verification.
//!
//! Senders sign each request with HMAC-SHA256 over
//! `timestamp + token + digest`, where `digest` is the hex SHA-256 of the
//! envelope and raw message (see [`message_digest`]). The signature therefore
//! binds the exact message: a captured signature cannot be reused for a
//! different sender, recipient or body. Timestamps outside the allowed skew
//! are rejected.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Signature fields carried by an intake request.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub timestamp: &'a str,
    pub token: &'a str,
    pub signature: &'a str,
}

/// Hex SHA-256 of `sender`, `recipient` and `raw`, each newline-terminated
/// except the body.
pub fn message_digest(sender: &str, recipient: &str, raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update(b"\n");
    hasher.update(recipient.as_bytes());
    hasher.update(b"\n");
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

/// Hex HMAC-SHA256 of `timestamp + token + digest` under `signing_key`.
pub fn sign(signing_key: &str, timestamp: &str, token: &str, digest: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    mac.update(digest.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Check `fields` for the message whose [`message_digest`] is `digest`,
/// allowing `max_age_seconds` of clock skew in either direction.
pub fn verify_signature(
    signing_key: &str,
    fields: SignedFields<'_>,
    digest: &str,
    max_age_seconds: u64,
) -> bool {
    let SignedFields {
        timestamp,
        token,
        signature,
    } = fields;

    if timestamp.is_empty() || token.is_empty() || signature.is_empty() {
        warn!(
            has_timestamp = !timestamp.is_empty(),
            has_token = !token.is_empty(),
            has_signature = !signature.is_empty(),
            "intake_signature_missing_fields"
        );
        return false;
    }

    let Ok(signed_at) = timestamp.parse::<u64>() else {
        warn!(timestamp = %timestamp, "intake_signature_invalid_timestamp");
        return false;
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let skew = now.abs_diff(signed_at);
    if skew > max_age_seconds {
        warn!(signed_at = signed_at, skew_seconds = skew, max_age_seconds = max_age_seconds, "intake_signature_stale");
        return false;
    }

    let Some(expected) = sign(signing_key, timestamp, token, digest) else {
        warn!("intake_signature_invalid_key");
        return false;
    };

    let valid = constant_time_eq(expected.as_bytes(), signature.as_bytes());
    if !valid {
        warn!("intake_signature_mismatch");
    }
    valid
}

/// Whether a non-blank signing key is configured.
pub fn signing_enabled(signing_key: Option<&str>) -> bool {
    signing_key.is_some_and(|k| !k.trim().is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn now() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    fn fields<'a>(timestamp: &'a str, token: &'a str, signature: &'a str) -> SignedFields<'a> {
        SignedFields {
            timestamp,
            token,
            signature,
        }
    }

    #[test]
    fn test_valid_signature() {
        let timestamp = now();
        let signature = sign("intake-key", &timestamp, "nonce-1", DIGEST).unwrap();

        assert!(verify_signature("intake-key", fields(&timestamp, "nonce-1", &signature), DIGEST, 300));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let timestamp = now();
        let signature = sign("other-key", &timestamp, "nonce-1", DIGEST).unwrap();

        assert!(!verify_signature("intake-key", fields(&timestamp, "nonce-1", &signature), DIGEST, 300));
    }

    #[test]
    fn test_signature_bound_to_message() {
        let timestamp = now();
        let digest = message_digest("a@example.org", "list@example.com", b"Subject: hi\r\n\r\nbody");
        let signature = sign("intake-key", &timestamp, "nonce-1", &digest).unwrap();
        let signed = fields(&timestamp, "nonce-1", &signature);

        assert!(verify_signature("intake-key", signed, &digest, 300));

        for (sender, recipient, raw) in [
            ("a@example.org", "list@example.com", &b"Subject: hi\r\n\r\nchanged"[..]),
            ("a@example.org", "other@example.com", &b"Subject: hi\r\n\r\nbody"[..]),
            ("b@example.org", "list@example.com", &b"Subject: hi\r\n\r\nbody"[..]),
        ] {
            let tampered = message_digest(sender, recipient, raw);
            assert!(!verify_signature("intake-key", signed, &tampered, 300));
        }
    }

    #[test]
    fn test_message_digest_separates_fields() {
        assert_ne!(
            message_digest("ab", "c", b""),
            message_digest("a", "bc", b"")
        );
        assert_eq!(message_digest("", "", b"").len(), 64);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(!verify_signature("key", fields("", "token", "sig"), DIGEST, 300));
        assert!(!verify_signature("key", fields("123", "", "sig"), DIGEST, 300));
        assert!(!verify_signature("key", fields("123", "token", ""), DIGEST, 300));
    }

    #[test]
    fn test_stale_and_garbage_timestamps_rejected() {
        let signature = sign("key", "946684800", "token", DIGEST).unwrap();
        assert!(!verify_signature("key", fields("946684800", "token", &signature), DIGEST, 300));
        assert!(!verify_signature("key", fields("yesterday", "token", "sig"), DIGEST, 300));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_signing_enabled() {
        assert!(!signing_enabled(None));
        assert!(!signing_enabled(Some("   ")));
        assert!(signing_enabled(Some("key123")));
    }
}
