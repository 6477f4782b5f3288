//! Exponential retry schedule for the status-poll path.
//!
//! The orchestrator stores the delay between polls as an ISO-8601 duration
//! (`PT45S`). Every pending poll advances it to the next power of two above the
//! current value, so a schedule seeded with 45 seconds continues 64, 128, 256.

use crate::error::{ConnectorError, Result};
use std::time::Duration;

/// Returns the delay that follows `current`.
///
/// For a delay of `n` whole seconds the result is `2^(floor(log2(n)) + 1)` seconds.
/// Sub-second precision is discarded. A zero delay has no logarithm and is rejected.
pub fn next_delay(current: Duration) -> Result<Duration> {
    let seconds = current.as_secs();
    if seconds == 0 {
        return Err(ConnectorError::InvalidBackoff(
            "backoff seed must be at least one second".to_string(),
        ));
    }

    let exponent = seconds.ilog2() + 1;
    1u64.checked_shl(exponent)
        .map(Duration::from_secs)
        .ok_or_else(|| ConnectorError::InvalidBackoff(format!("{}s overflows", seconds)))
}

/// True once `attempt_count` has gone past the configured ceiling.
pub fn is_retry_exceeded(attempt_count: u32, max_retries: u32) -> bool {
    attempt_count > max_retries
}

/// Parses the orchestrator's `PT<n>S` timer representation.
pub fn parse_timer(timer: &str) -> Result<Duration> {
    let seconds = timer
        .trim()
        .strip_prefix("PT")
        .and_then(|rest| rest.strip_suffix('S'))
        .ok_or_else(|| ConnectorError::InvalidBackoff(format!("unsupported timer '{}'", timer)))?;

    seconds
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConnectorError::InvalidBackoff(format!("unsupported timer '{}'", timer)))
}

pub fn format_timer(delay: Duration) -> String {
    format!("PT{}S", delay.as_secs())
}

/// Convenience for the poll path: parse, advance, format.
pub fn next_timer(timer: &str) -> Result<String> {
    parse_timer(timer).and_then(next_delay).map(format_timer)
}
