// crates/tillhouse-core/src/time.rs
// ============================================================================
// Module: Tillhouse Time
// Description: Wall-clock helpers shared by registry and lifecycle code.
// Purpose: Keep a single representation for stored timestamps.
// Dependencies: std
// ============================================================================

//! Timestamps are stored as unix epoch milliseconds (`INTEGER` columns).

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
