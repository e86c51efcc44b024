//! Wall-clock helper for call sites that are not given a `now` by their
//! caller (background A2A continuations, the scheduler's own timer tick).
//! Synchronous state-machine operations elsewhere in the workspace take
//! `now: i64` explicitly instead, so tests can drive them deterministically.
//!
//! Grounded on the teacher's `current_timestamp_millis`
//! (`core/src/time.rs`).

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
