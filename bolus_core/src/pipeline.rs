//! Dose calculations behind each pipeline branch.
//!
//! The branch selection itself lives in `EngineCore`; these functions are
//! pure and take everything they need as arguments.

use bolus_traits::{LearningProfile, MealBucket};

use crate::config::{SafetyCfg, Therapy};
use crate::safety::{get_safe_dose_with_learning, iob_hard_block};
use crate::types::TrendMetrics;

/// Added to glucose when the caller gives no prediction.
pub const DEFAULT_PEAK_RISE: f64 = 2.0;
/// Trend (per hour) above which corrections are scaled up.
pub const TREND_SCALE_THRESHOLD: f64 = 0.2;
pub const PEAK_DAMPING: f64 = 0.5;
pub const PEAK_DAMPING_RANGE: f64 = 1.5;
pub const HYPO_RISK_FACTOR: f64 = 0.25;
/// Share of the correction added on top of an above-target meal bolus.
pub const MEAL_CORRECTION_SHARE: f64 = 0.3;
pub const EARLY_BOOST_RANGE: (f64, f64) = (8.0, 9.9);
pub const EARLY_BOOST_PEAK: f64 = 10.0;

/// Predicted peak for this cycle and whether it was forced to the current level.
pub fn predicted_peak(glucose: f64, predicted: Option<f64>, trend: &TrendMetrics) -> (f64, bool) {
    if trend.recent_trend <= 0.0 {
        return (glucose, true);
    }
    (predicted.unwrap_or(glucose + DEFAULT_PEAK_RISE), false)
}

/// `max(0, (g - target) / isf)`; a non-positive ISF yields 0.
pub fn base_correction(glucose: f64, target: f64, isf: f64) -> f64 {
    if isf <= 0.0 {
        return 0.0;
    }
    ((glucose - target) / isf).max(0.0)
}

/// Base correction resolved against its learned variant.
pub fn resolved_correction(
    glucose: f64,
    therapy: &Therapy,
    profile: &LearningProfile,
    hour: u8,
) -> f64 {
    let calculated = base_correction(glucose, therapy.target, therapy.isf);
    let learned = calculated * profile.personal_isf * profile.hourly_factor(hour);
    get_safe_dose_with_learning(calculated, learned, profile.confidence)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub dose: f64,
    pub deliver: bool,
    pub notes: Vec<&'static str>,
}

/// Scale a resolved correction by trend, peak damping, hypo risk and start
/// boost, and decide whether it may be delivered.
pub fn calculate_correction(
    base: f64,
    glucose: f64,
    iob: f64,
    peak: f64,
    trend: &TrendMetrics,
    therapy: &Therapy,
    cfg: &SafetyCfg,
) -> Correction {
    let mut notes = Vec::new();
    let mut dose = base.max(0.0);
    let t = trend.recent_trend;

    if t > TREND_SCALE_THRESHOLD {
        dose *= 1.0 + (t / 0.3).min(2.0);
        notes.push("trend scaled");
    }
    if t <= 0.0 && glucose - therapy.target <= PEAK_DAMPING_RANGE {
        dose *= PEAK_DAMPING;
        notes.push("peak damping");
    }
    let projected = glucose + t * 2.0 - iob * therapy.isf;
    if projected < cfg.hypo_threshold {
        dose *= HYPO_RISK_FACTOR;
        notes.push("hypo risk");
    }
    let gap = (peak - glucose).max(0.0);
    if gap > 0.0 {
        dose *= 1.0 + (gap / 10.0).min(0.3);
        notes.push("start boost");
    }

    let reversing = trend.short_term_trend <= 0.0 || trend.acceleration < -0.1;
    let deliver = t > 0.5 && glucose > therapy.target + 1.0 && !reversing;
    Correction {
        dose,
        deliver,
        notes,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedBolus {
    pub full: f64,
    pub immediate: f64,
    pub reserved: f64,
}

/// Immediate fraction of a meal bolus by distance to target.
pub fn immediate_fraction(glucose: f64, target: f64) -> f64 {
    let distance = (glucose - target).abs();
    if distance <= 1.0 {
        0.3
    } else if distance <= 3.0 {
        0.4
    } else {
        0.6
    }
}

/// Split a meal bolus for `carbs` into an immediate part and a reserved rest.
pub fn calculate_staged_bolus(
    carbs: f64,
    glucose: f64,
    meal_confidence: f64,
    therapy: &Therapy,
    profile: &LearningProfile,
    bucket: MealBucket,
) -> StagedBolus {
    if carbs <= 0.0 || therapy.carb_ratio <= 0.0 {
        return StagedBolus {
            full: 0.0,
            immediate: 0.0,
            reserved: 0.0,
        };
    }
    let calculated = carbs / therapy.carb_ratio;
    let learned = calculated * profile.personal_carb_ratio * profile.timing_factor(bucket);
    let full = get_safe_dose_with_learning(calculated, learned, profile.confidence);

    let fraction = immediate_fraction(glucose, therapy.target)
        * (0.8 + 0.2 * meal_confidence.clamp(0.0, 1.0));
    let immediate = full * fraction;
    StagedBolus {
        full,
        immediate,
        reserved: (full - immediate).max(0.0),
    }
}

/// Early boost for a rise heading above 10. `None` when it does not apply.
pub fn early_boost(
    dose: f64,
    glucose: f64,
    peak: f64,
    iob: f64,
    trend: &TrendMetrics,
    therapy: &Therapy,
) -> Option<f64> {
    if !(EARLY_BOOST_RANGE.0..=EARLY_BOOST_RANGE.1).contains(&glucose) || peak <= EARLY_BOOST_PEAK {
        return None;
    }
    if iob_hard_block(iob, therapy.max_iob, trend.recent_trend) {
        return None;
    }
    let gap = (peak - glucose).max(0.0);
    let boosted = dose * therapy.aggressiveness_pct / 100.0 * (1.0 + (gap / 10.0).min(0.3));
    let ceiling = therapy.max_iob * (1.0 + ((peak - EARLY_BOOST_PEAK).max(0.0) / 5.0).min(0.5));
    let room = (ceiling - iob).max(0.0);
    Some(boosted.min(therapy.max_bolus).min(room).max(0.0))
}
