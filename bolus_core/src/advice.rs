use core::fmt;

use bolus_traits::LearningProfile;

use crate::meal::MealState;
use crate::phase::Phase;
use crate::sensor::SensorIssue;

/// Learning state reported alongside each advice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearningSnapshot {
    pub personal_carb_ratio: f64,
    pub personal_isf: f64,
    pub confidence: f64,
    pub total_samples: u64,
}

impl From<&LearningProfile> for LearningSnapshot {
    fn from(p: &LearningProfile) -> Self {
        Self {
            personal_carb_ratio: p.personal_carb_ratio,
            personal_isf: p.personal_isf,
            confidence: p.confidence,
            total_samples: p.total_samples,
        }
    }
}

/// Result of one decision cycle. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    /// Units, a multiple of 0.05 within [0, max_bolus].
    pub dose: f64,
    pub rationale: String,
    pub confidence: f64,
    pub predicted_peak: f64,
    pub meal_detected: bool,
    pub detected_carbs: f64,
    pub should_deliver: bool,
    pub phase: Phase,
    /// Amount parked in the pending reservation after this cycle.
    pub reserved_dose: f64,
    pub carbs_on_board: f64,
    pub meal_state: MealState,
    pub sensor_issue: Option<SensorIssue>,
    pub learning: LearningSnapshot,
}

impl Advice {
    /// Zero-dose, non-delivering advice for a cycle that could not be computed.
    pub fn safe_error(fault: &dyn fmt::Display, learning: LearningSnapshot) -> Self {
        Self::idle(
            Phase::Error,
            format!("{}: {fault}", Phase::Error.label()),
            0.0,
            learning,
        )
    }

    pub(crate) fn idle(
        phase: Phase,
        rationale: String,
        confidence: f64,
        learning: LearningSnapshot,
    ) -> Self {
        Self {
            dose: 0.0,
            rationale,
            confidence,
            predicted_peak: 0.0,
            meal_detected: false,
            detected_carbs: 0.0,
            should_deliver: false,
            phase,
            reserved_dose: 0.0,
            carbs_on_board: 0.0,
            meal_state: MealState::None,
            sensor_issue: None,
            learning,
        }
    }
}
