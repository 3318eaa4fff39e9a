//! Persisted learning data shared between the engine and store implementations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounds for the carb-ratio dose multiplier.
pub const CARB_RATIO_RANGE: (f64, f64) = (0.7, 1.3);
/// Bounds for the ISF dose multiplier.
pub const ISF_RANGE: (f64, f64) = (0.8, 1.2);

/// Meal-time bucket derived from the local hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealBucket {
    Breakfast,
    Lunch,
    Dinner,
    Other,
}

impl MealBucket {
    /// Breakfast 05–10, lunch 11–15, dinner 17–21, anything else is `Other`.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Breakfast,
            11..=15 => Self::Lunch,
            17..=21 => Self::Dinner,
            _ => Self::Other,
        }
    }
}

/// Adaptive multipliers learned from meal outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningProfile {
    /// Multiplier applied to the meal bolus, kept in [0.7, 1.3].
    pub personal_carb_ratio: f64,
    /// Multiplier applied to the correction dose, kept in [0.8, 1.2].
    pub personal_isf: f64,
    #[serde(default)]
    pub meal_timing_factors: BTreeMap<MealBucket, f64>,
    /// Hour of day (0..24, local) to multiplier.
    #[serde(default)]
    pub hourly_sensitivity: BTreeMap<u8, f64>,
    /// Trust in the learned values, in [0, 1].
    pub confidence: f64,
    pub total_samples: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for LearningProfile {
    fn default() -> Self {
        Self {
            personal_carb_ratio: 1.0,
            personal_isf: 1.0,
            meal_timing_factors: BTreeMap::new(),
            hourly_sensitivity: BTreeMap::new(),
            confidence: 0.0,
            total_samples: 0,
            last_updated: None,
        }
    }
}

impl LearningProfile {
    /// Timing multiplier for a bucket; 1.0 until something was learned.
    pub fn timing_factor(&self, bucket: MealBucket) -> f64 {
        self.meal_timing_factors.get(&bucket).copied().unwrap_or(1.0)
    }

    /// Sensitivity multiplier for a local hour; 1.0 until something was learned.
    pub fn hourly_factor(&self, hour: u8) -> f64 {
        self.hourly_sensitivity.get(&hour).copied().unwrap_or(1.0)
    }

    /// Force every field back into its documented range.
    ///
    /// Non-finite values fall back to the neutral default.
    pub fn sanitized(mut self) -> Self {
        let fix = |v: f64, lo: f64, hi: f64, neutral: f64| {
            if v.is_finite() { v.clamp(lo, hi) } else { neutral }
        };
        self.personal_carb_ratio = fix(
            self.personal_carb_ratio,
            CARB_RATIO_RANGE.0,
            CARB_RATIO_RANGE.1,
            1.0,
        );
        self.personal_isf = fix(self.personal_isf, ISF_RANGE.0, ISF_RANGE.1, 1.0);
        self.confidence = fix(self.confidence, 0.0, 1.0, 0.0);
        self.meal_timing_factors.retain(|_, v| v.is_finite());
        self.hourly_sensitivity.retain(|h, v| *h < 24 && v.is_finite());
        self
    }
}

/// One scored meal, as handed to the store for later analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealOutcomeRecord {
    pub detected_at: DateTime<Utc>,
    pub scored_at: DateTime<Utc>,
    pub bucket: MealBucket,
    pub carbs_g: f64,
    pub insulin_u: f64,
    pub start_glucose: f64,
    pub peak_glucose: f64,
    /// Minutes between meal detection and the observed peak.
    pub time_to_peak_min: f64,
    pub effectiveness: f64,
}
