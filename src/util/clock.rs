//! Wall-clock helpers.
//!
//! All engine timestamps are milliseconds since the Unix epoch. Ticks take the
//! current time as an argument; only the background loops read the clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Add a duration to a millisecond timestamp.
#[must_use]
pub fn add_duration(at_ms: u128, duration: Duration) -> u128 {
    at_ms.saturating_add(duration.as_millis())
}
