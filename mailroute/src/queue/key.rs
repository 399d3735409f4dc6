//! Queue key generation.
//!
//! Keys look like `0001718000000123456.0000004242_0000000007.9f3a61c2`:
//! microseconds since the epoch, process id, per-process sequence, random
//! salt. Fixed-width numeric fields make lexical order match push order
//! within a process, which is what `pop` relies on for oldest-first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_MICROS: AtomicU64 = AtomicU64::new(0);
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a new, filesystem-safe, time-sortable key.
pub fn generate_key() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;

    // Never step backwards if the wall clock does.
    let micros = LAST_MICROS.fetch_max(now, Ordering::SeqCst).max(now);
    let sequence = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    let salt: u32 = rand::random();

    format!(
        "{:019}.{:010}_{:010}.{:08x}",
        micros,
        std::process::id(),
        sequence,
        salt
    )
}

/// Whether `key` can be used as a single path segment without escaping.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}
