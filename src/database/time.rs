//! Timestamp helpers for the database layer.
//!
//! SQLite columns hold `INTEGER` Unix epoch milliseconds (UTC); chrono types
//! only appear at the edges, converting to and from upstream payloads.

use chrono::{DateTime, Utc};

/// Milliseconds per UTC calendar day.
const DAY_MS: i64 = 86_400_000;

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a `DateTime<Utc>` to Unix epoch milliseconds.
#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`, clamping values
/// outside chrono's representable range.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(if ms < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Start of the UTC calendar day containing `ms`, as epoch milliseconds.
///
/// Unix time has no leap seconds, so flooring to a day boundary is plain
/// integer arithmetic; `rem_euclid` keeps pre-1970 values flooring downward.
#[inline]
pub fn utc_day_start_ms(ms: i64) -> i64 {
    ms - ms.rem_euclid(DAY_MS)
}
