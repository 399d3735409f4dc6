//! Queue-to-queue validation pass.

use anyhow::{Context, Result};
use tracing::info;

use super::parser::parse_raw_email;
use crate::queue::QueueStore;

/// Decode every message in `input` and copy it into `output`.
///
/// Stops at the first message that fails to decode; messages copied before
/// it stay in `output`. The input queue is left untouched.
pub fn cleanse(input: &QueueStore, output: &QueueStore) -> Result<usize> {
    let mut copied = 0;

    for key in input.keys()? {
        let blob = match input.get(&key) {
            Ok(blob) => blob,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };

        parse_raw_email(&blob).with_context(|| format!("Message {} could not be decoded", key))?;
        let new_key = output.push(&blob)?;

        info!(
            input = %input.dir().display(),
            output = %output.dir().display(),
            key = %key,
            new_key = %new_key,
            "cleanse_copied"
        );
        copied += 1;
    }

    Ok(copied)
}
