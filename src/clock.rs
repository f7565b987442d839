//! Wall-clock helpers shared across the runtime.
//!
//! Persisted timestamps (identity aliases, session state, room state) are
//! fractional epoch seconds so payloads stay readable and stable across
//! upgrades. Monotonic timing (persona cooldowns, debounce) uses
//! [`std::time::Instant`] instead.

use chrono::Utc;

/// Current wall-clock time as fractional epoch seconds.
#[must_use]
pub fn epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Current wall-clock time as whole epoch seconds.
#[must_use]
pub fn epoch_secs_whole() -> i64 {
    Utc::now().timestamp()
}
