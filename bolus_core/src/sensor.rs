//! Sensor plausibility guard.
//!
//! Recomputed every cycle from the history tail; any issue forces the
//! zero-dose sensor branch.

use crate::types::GlucoseSample;
use crate::util::minutes_between;

/// Largest plausible change per 5 minutes.
pub const MAX_STEP_PER_5MIN: f64 = 1.5;
/// Compression plateaus are only suspected at or below this level.
pub const COMPRESSION_CEILING: f64 = 4.0;
pub const COMPRESSION_MIN_DROP: f64 = 1.0;
pub const FLAT_TOLERANCE: f64 = 0.1;
/// Step deltas at or below this are ignored when counting reversals.
pub const OSCILLATION_MIN_STEP: f64 = 0.2;
pub const OSCILLATION_MIN_FLIPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorIssue {
    JumpTooLarge,
    Oscillation,
    CompressionLow,
}

impl SensorIssue {
    pub const fn describe(self) -> &'static str {
        match self {
            SensorIssue::JumpTooLarge => "implausible glucose jump",
            SensorIssue::Oscillation => "oscillating sensor readings",
            SensorIssue::CompressionLow => "compression low suspected",
        }
    }
}

fn jump_too_large(history: &[GlucoseSample]) -> bool {
    let n = history.len();
    let first = n.saturating_sub(3).max(1);
    (first..n).any(|i| {
        let a = &history[i - 1];
        let b = &history[i];
        let spacing = minutes_between(a.timestamp, b.timestamp).max(1.0);
        let limit = MAX_STEP_PER_5MIN * spacing / 5.0;
        (b.glucose - a.glucose).abs() > limit
    })
}

fn compression_low(history: &[GlucoseSample]) -> bool {
    let n = history.len();
    if n < 3 {
        return false;
    }
    let newest = history[n - 1].glucose;
    let plateau = history[n - 2].glucose;
    if newest > COMPRESSION_CEILING || (newest - plateau).abs() > FLAT_TOLERANCE {
        return false;
    }
    // the drop into the plateau happened within the two steps before it
    let before = history[n.saturating_sub(4)..n - 2]
        .iter()
        .map(|s| s.glucose)
        .fold(f64::NEG_INFINITY, f64::max);
    before - plateau >= COMPRESSION_MIN_DROP
}

fn oscillation(history: &[GlucoseSample]) -> bool {
    let tail = &history[history.len().saturating_sub(6)..];
    let mut flips = 0usize;
    let mut prev_sign = 0.0f64;
    for w in tail.windows(2) {
        let d = w[1].glucose - w[0].glucose;
        if d.abs() <= OSCILLATION_MIN_STEP {
            continue;
        }
        let sign = d.signum();
        if prev_sign != 0.0 && sign != prev_sign {
            flips += 1;
        }
        prev_sign = sign;
    }
    flips >= OSCILLATION_MIN_FLIPS
}

/// First matching issue on the history tail, if any.
pub fn check(history: &[GlucoseSample]) -> Option<SensorIssue> {
    if history.len() < 2 {
        return None;
    }
    if jump_too_large(history) {
        Some(SensorIssue::JumpTooLarge)
    } else if compression_low(history) {
        Some(SensorIssue::CompressionLow)
    } else if oscillation(history) {
        Some(SensorIssue::Oscillation)
    } else {
        None
    }
}
