//! Runtime configuration for the bolus engine.
//!
//! These are the structs `EngineCore` works with; TOML deserialization lives
//! in `bolus_config` and is bridged in `conversions`.

/// Per-cycle therapy settings. Glucose in mmol/L, insulin in units.
#[derive(Debug, Clone, PartialEq)]
pub struct Therapy {
    pub target: f64,
    /// Glucose drop per unit of insulin.
    pub isf: f64,
    /// Grams of carbohydrate per unit.
    pub carb_ratio: f64,
    pub max_bolus: f64,
    pub max_iob: f64,
    /// Early-boost scaling, 100 = neutral.
    pub aggressiveness_pct: f64,
    /// External reduction applied to every dose, 0 = none.
    pub dose_reduction_pct: f64,
}

impl Default for Therapy {
    fn default() -> Self {
        Self {
            target: 6.0,
            isf: 2.0,
            carb_ratio: 10.0,
            max_bolus: 5.0,
            max_iob: 10.0,
            aggressiveness_pct: 100.0,
            dose_reduction_pct: 0.0,
        }
    }
}

/// Meal detection gates and timing.
#[derive(Debug, Clone)]
pub struct MealCfg {
    /// Confidence must be strictly above this before any meal bolus.
    pub min_confidence: f64,
    pub min_carbs_above_target: f64,
    pub min_carbs_below_target: f64,
    pub episode_timeout_min: f64,
    pub absorption_min: f64,
}

impl Default for MealCfg {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            min_carbs_above_target: 10.0,
            min_carbs_below_target: 12.0,
            episode_timeout_min: 120.0,
            absorption_min: 180.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyCfg {
    /// Minimum spacing between a delivered bolus and a reserved release.
    pub min_bolus_interval_min: f64,
    /// Doses below this are reported but never delivered.
    pub min_deliverable: f64,
    pub hypo_threshold: f64,
    /// Glucose within `target + target_band` counts as stable.
    pub target_band: f64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            min_bolus_interval_min: 10.0,
            min_deliverable: 0.1,
            hypo_threshold: 4.0,
            target_band: 0.5,
        }
    }
}

/// Splitting of large immediate meal portions into timed steps.
#[derive(Debug, Clone)]
pub struct ExtendedCfg {
    pub enabled: bool,
    pub split_above: f64,
    pub steps: u32,
    pub step_interval_min: f64,
}

impl Default for ExtendedCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            split_above: 1.5,
            steps: 3,
            step_interval_min: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearningCfg {
    /// Expected uncovered rise per gram of carbs, before personal scaling.
    pub rise_per_gram: f64,
    /// Local offset from UTC for hour-of-day buckets.
    pub utc_offset_min: i32,
}

impl Default for LearningCfg {
    fn default() -> Self {
        Self {
            rise_per_gram: 0.2,
            utc_offset_min: 0,
        }
    }
}
