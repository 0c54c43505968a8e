//! Score function: folds "when" and "how urgent" into one sort key.
//!
//! `score = now + delay - priority * weight`, all in milliseconds. Lower
//! scores are popped first, so a single pop-min serves both delay scheduling
//! and priority scheduling.
//!
//! The delayed set is scored with [`due_at`] alone: a priority bonus there
//! would let a job become due before its delay has passed.

use std::time::Duration;

/// Sort key used by the pending and delayed sets (epoch milliseconds).
pub type Score = i64;

/// Default weight of one priority unit: one second of queue jump.
pub const DEFAULT_PRIORITY_WEIGHT_MS: i64 = 1000;

pub fn score(now_ms: i64, delay: Option<Duration>, priority: i64, weight_ms: i64) -> Score {
    let delay_ms = delay.map_or(0, duration_ms);
    now_ms
        .saturating_add(delay_ms)
        .saturating_sub(priority.saturating_mul(weight_ms))
}

/// `now + delay` with no priority component, used for retries.
pub fn due_at(now_ms: i64, delay: Duration) -> Score {
    now_ms.saturating_add(duration_ms(delay))
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
