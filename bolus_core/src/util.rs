//! Common time helpers for bolus_core.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Minutes from `from` to `to` (negative when `to` is earlier).
#[inline]
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Convert a change over `minutes` into a per-hour rate.
/// Returns 0.0 when the elapsed time is not positive.
#[inline]
pub fn per_hour(delta: f64, minutes: f64) -> f64 {
    if minutes > 0.0 && delta.is_finite() {
        delta / minutes * 60.0
    } else {
        0.0
    }
}

/// Local hour of day (0..=23) for `t` at a fixed offset from UTC.
#[inline]
pub fn local_hour(t: DateTime<Utc>, utc_offset_min: i32) -> u8 {
    let local = t + Duration::minutes(i64::from(utc_offset_min));
    // hour() is always < 24
    u8::try_from(local.hour()).unwrap_or(0)
}
