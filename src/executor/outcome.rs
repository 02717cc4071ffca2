//! Result extraction from the sandbox's combined output.
//!
//! The wrapper and this module share a framing protocol: the authoritative
//! result is the last line carrying the sentinel prefix, followed by one JSON
//! object with optional `result` and `error` string fields. Scanning from the
//! end keeps stray user output on either side of the envelope from changing
//! which line wins.

use anyhow::anyhow;
use serde::Deserialize;

use crate::{error::ExecError, models::ExecutionOutcome};

pub const RESULT_SENTINEL: &str = "__EXECBOX_RESULT__";

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<String>,
    error: Option<String>,
}

pub fn extract(combined_output: &str) -> Result<ExecutionOutcome, ExecError> {
    let envelope_json = combined_output
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(RESULT_SENTINEL))
        .ok_or_else(|| {
            ExecError::Orchestration(anyhow!(
                "sandbox output carried no result envelope: {}",
                truncate(combined_output, 512)
            ))
        })?;

    let envelope: Envelope = serde_json::from_str(envelope_json).map_err(|err| {
        ExecError::Orchestration(anyhow!("malformed result envelope: {err}"))
    })?;

    Ok(ExecutionOutcome {
        result: envelope.result.unwrap_or_default(),
        error: envelope.error,
    })
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
