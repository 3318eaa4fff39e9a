//! Trend analysis over the glucose history tail.
//!
//! Pure functions of the history slice: the same input always yields the same
//! metrics, and too-short or non-monotonic windows collapse to 0.0.

use crate::types::{GlucoseSample, TrendMetrics};
use crate::util::{minutes_between, per_hour};

/// Samples looked back for `recent_trend`.
pub const RECENT_LOOKBACK: usize = 4;
/// Samples looked back for `short_term_trend`.
pub const SHORT_LOOKBACK: usize = 2;

/// Rate of change (per hour) over the window ending at `end`, `lookback`
/// samples long. 0.0 when the window does not fit.
fn rate_ending_at(history: &[GlucoseSample], end: usize, lookback: usize) -> f64 {
    if end >= history.len() || end < lookback {
        return 0.0;
    }
    let a = &history[end - lookback];
    let b = &history[end];
    per_hour(
        b.glucose - a.glucose,
        minutes_between(a.timestamp, b.timestamp),
    )
}

pub fn analyze(history: &[GlucoseSample]) -> TrendMetrics {
    let n = history.len();
    if n == 0 {
        return TrendMetrics::default();
    }
    let last = n - 1;
    let recent_trend = rate_ending_at(history, last, RECENT_LOOKBACK);
    let short_term_trend = rate_ending_at(history, last, SHORT_LOOKBACK);

    let acceleration = if last >= SHORT_LOOKBACK * 2 {
        let prev_end = last - SHORT_LOOKBACK;
        let prev = rate_ending_at(history, prev_end, SHORT_LOOKBACK);
        let minutes = minutes_between(history[prev_end].timestamp, history[last].timestamp);
        if minutes > 0.0 {
            (short_term_trend - prev) / minutes
        } else {
            0.0
        }
    } else {
        0.0
    };

    TrendMetrics {
        recent_trend,
        short_term_trend,
        acceleration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<GlucoseSample> {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, g)| GlucoseSample::new(t0 + Duration::minutes(5 * i as i64), *g, 0.0))
            .collect()
    }

    #[test]
    fn short_history_is_flat() {
        assert_eq!(analyze(&[]), TrendMetrics::default());
        let m = analyze(&series(&[6.0, 7.0]));
        assert_eq!(m, TrendMetrics::default());
    }

    #[test]
    fn three_samples_only_have_short_term() {
        let m = analyze(&series(&[6.0, 6.5, 7.0]));
        assert_eq!(m.recent_trend, 0.0);
        assert!((m.short_term_trend - 6.0).abs() < 1e-9);
        assert_eq!(m.acceleration, 0.0);
    }

    #[test]
    fn linear_rise_has_no_acceleration() {
        let m = analyze(&series(&[6.0, 6.25, 6.5, 6.75, 7.0]));
        assert!((m.recent_trend - 3.0).abs() < 1e-9);
        assert!((m.short_term_trend - 3.0).abs() < 1e-9);
        assert!(m.acceleration.abs() < 1e-9);
    }

    #[test]
    fn curving_rise_accelerates() {
        let m = analyze(&series(&[6.0, 6.0, 6.0, 6.5, 7.5]));
        assert!(m.short_term_trend > 0.0);
        // short now 9/h, two samples earlier 0/h, 10 minutes apart
        assert!((m.acceleration - 0.9).abs() < 1e-9);
    }

    #[test]
    fn non_monotonic_timestamps_collapse_to_zero() {
        let mut h = series(&[6.0, 6.5, 7.0, 7.5, 8.0]);
        h[4].timestamp = h[0].timestamp;
        let m = analyze(&h);
        assert_eq!(m.recent_trend, 0.0);
    }
}
