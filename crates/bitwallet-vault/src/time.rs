//! Wall-clock helpers. All timestamps and deadlines are Unix epoch milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Current time in epoch milliseconds.
///
/// A clock set before 1970 reads as `0`; one past `i64::MAX` ms saturates.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Deadline `days` days after `now_ms`, saturating at `i64::MAX`.
#[must_use]
pub fn deadline_after_days(now_ms: i64, days: u32) -> i64 {
    now_ms.saturating_add(MILLIS_PER_DAY.saturating_mul(i64::from(days)))
}
