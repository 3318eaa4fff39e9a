//! Safety interlock applied to every cycle's final dose.

use crate::config::{SafetyCfg, Therapy};
use crate::fixed_point::round_dose;

/// IOB fraction of `max_iob` at which dosing is hard-blocked on a flat or falling trend.
pub const HARD_BLOCK_IOB_FRACTION: f64 = 0.9;
/// IOB fraction of `max_iob` above which below-target meal doses start shrinking.
pub const REDUCTION_START_FRACTION: f64 = 0.5;

/// Multiplier in [0, 1] for below-target meal boluses: 1.0 under half of
/// `max_iob`, then linear down to 0 at `max_iob`.
pub fn iob_reduction_factor(iob: f64, max_iob: f64) -> f64 {
    if max_iob <= 0.0 {
        return 0.0;
    }
    let start = max_iob * REDUCTION_START_FRACTION;
    if iob < start {
        1.0
    } else if iob >= max_iob {
        0.0
    } else {
        ((max_iob - iob) / (max_iob - start)).clamp(0.0, 1.0)
    }
}

/// Resolve a calculated dose against its learned counterpart by profile confidence.
pub fn get_safe_dose_with_learning(calculated: f64, learned: f64, confidence: f64) -> f64 {
    if confidence < 0.3 {
        calculated * 0.7
    } else if confidence <= 0.6 {
        calculated * 0.8
    } else if confidence <= 0.8 {
        (calculated + learned) / 2.0
    } else {
        learned
    }
}

/// IOB near the ceiling with no rise to justify more insulin.
pub fn iob_hard_block(iob: f64, max_iob: f64, recent_trend: f64) -> bool {
    iob >= HARD_BLOCK_IOB_FRACTION * max_iob && recent_trend <= 0.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interlock {
    pub dose: f64,
    pub deliver: bool,
    pub below_floor: bool,
    pub hard_blocked: bool,
    /// Units of the requested dose cut by the `max_bolus` clamp, before reduction.
    pub held_back: f64,
}

/// Reduction, clamp, 0.05 U rounding, materiality floor and hard block, in that order.
pub fn apply(
    dose: f64,
    deliver: bool,
    iob: f64,
    recent_trend: f64,
    therapy: &Therapy,
    cfg: &SafetyCfg,
) -> Interlock {
    let reduction = (100.0 - therapy.dose_reduction_pct.clamp(0.0, 100.0)) / 100.0;
    let reduced = if dose.is_finite() { dose * reduction } else { 0.0 };
    let clamped = reduced.clamp(0.0, therapy.max_bolus.max(0.0));
    let rounded = round_dose(clamped, therapy.max_bolus);
    let held_back = if reduction > 0.0 {
        (reduced - clamped).max(0.0) / reduction
    } else {
        0.0
    };

    let below_floor = rounded < cfg.min_deliverable;
    let mut out = Interlock {
        dose: rounded,
        deliver: deliver && !below_floor,
        below_floor,
        hard_blocked: false,
        held_back,
    };
    if iob_hard_block(iob, therapy.max_iob, recent_trend) {
        out.dose = 0.0;
        out.deliver = false;
        out.hard_blocked = true;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_factor_shape() {
        assert_eq!(iob_reduction_factor(0.0, 10.0), 1.0);
        assert_eq!(iob_reduction_factor(4.9, 10.0), 1.0);
        assert!((iob_reduction_factor(7.5, 10.0) - 0.5).abs() < 1e-12);
        assert_eq!(iob_reduction_factor(10.0, 10.0), 0.0);
        assert_eq!(iob_reduction_factor(12.0, 10.0), 0.0);
    }

    #[test]
    fn safe_dose_bands() {
        assert!((get_safe_dose_with_learning(1.0, 2.0, 0.1) - 0.7).abs() < 1e-12);
        assert!((get_safe_dose_with_learning(1.0, 2.0, 0.6) - 0.8).abs() < 1e-12);
        assert!((get_safe_dose_with_learning(1.0, 2.0, 0.7) - 1.5).abs() < 1e-12);
        assert!((get_safe_dose_with_learning(1.0, 2.0, 0.9) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dose_reduction_applies_before_rounding() {
        let therapy = Therapy {
            dose_reduction_pct: 50.0,
            ..Therapy::default()
        };
        let out = apply(1.0, true, 0.0, 0.0, &therapy, &SafetyCfg::default());
        assert_eq!(out.dose, 0.5);
        assert!(out.deliver);
    }

    #[test]
    fn floor_suppresses_delivery_but_keeps_dose() {
        let out = apply(0.05, true, 0.0, 1.0, &Therapy::default(), &SafetyCfg::default());
        assert_eq!(out.dose, 0.05);
        assert!(!out.deliver);
        assert!(out.below_floor);
    }

    #[test]
    fn hard_block_zeroes() {
        let therapy = Therapy::default();
        let out = apply(2.0, true, 9.5, -0.1, &therapy, &SafetyCfg::default());
        assert_eq!(out.dose, 0.0);
        assert!(!out.deliver);
        assert!(out.hard_blocked);
    }

    #[test]
    fn clamp_reports_held_back_units() {
        let therapy = Therapy {
            max_bolus: 1.0,
            dose_reduction_pct: 50.0,
            ..Therapy::default()
        };
        let out = apply(3.0, true, 0.0, 0.0, &therapy, &SafetyCfg::default());
        assert_eq!(out.dose, 1.0);
        assert!((out.held_back - 1.0).abs() < 1e-12);
        let out = apply(1.0, true, 0.0, 0.0, &therapy, &SafetyCfg::default());
        assert_eq!(out.held_back, 0.0);
    }
}
