//! `From` implementations bridging `bolus_config` types to `bolus_core` types.

use crate::config::{ExtendedCfg, LearningCfg, MealCfg, SafetyCfg, Therapy};
use crate::types::GlucoseSample;

// ── Therapy ──────────────────────────────────────────────────────────────────

impl From<&bolus_config::TherapyCfg> for Therapy {
    fn from(c: &bolus_config::TherapyCfg) -> Self {
        Self {
            target: c.target_mmol,
            isf: c.isf_mmol_per_u,
            carb_ratio: c.carb_ratio_g_per_u,
            max_bolus: c.max_bolus_u,
            max_iob: c.max_iob_u,
            aggressiveness_pct: c.aggressiveness_pct,
            dose_reduction_pct: c.dose_reduction_pct,
        }
    }
}

// ── MealCfg ──────────────────────────────────────────────────────────────────

impl From<&bolus_config::MealCfg> for MealCfg {
    fn from(c: &bolus_config::MealCfg) -> Self {
        Self {
            min_confidence: c.min_confidence,
            min_carbs_above_target: c.min_carbs_above_target_g,
            min_carbs_below_target: c.min_carbs_below_target_g,
            episode_timeout_min: c.episode_timeout_min,
            absorption_min: c.absorption_min,
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&bolus_config::SafetyCfg> for SafetyCfg {
    fn from(c: &bolus_config::SafetyCfg) -> Self {
        Self {
            min_bolus_interval_min: c.min_bolus_interval_min,
            min_deliverable: c.min_deliverable_u,
            hypo_threshold: c.hypo_threshold_mmol,
            target_band: c.target_band_mmol,
        }
    }
}

// ── ExtendedCfg ──────────────────────────────────────────────────────────────

impl From<&bolus_config::ExtendedCfg> for ExtendedCfg {
    fn from(c: &bolus_config::ExtendedCfg) -> Self {
        Self {
            enabled: c.enabled,
            split_above: c.split_above_u,
            steps: c.steps,
            step_interval_min: c.step_interval_min,
        }
    }
}

// ── LearningCfg ──────────────────────────────────────────────────────────────

/// Needs the whole config: the hour-of-day offset lives under `[engine]`.
impl From<&bolus_config::Config> for LearningCfg {
    fn from(c: &bolus_config::Config) -> Self {
        Self {
            rise_per_gram: c.learning.rise_per_gram_mmol,
            utc_offset_min: c.engine.utc_offset_min,
        }
    }
}

// ── History ──────────────────────────────────────────────────────────────────

impl From<&bolus_config::SampleRow> for GlucoseSample {
    fn from(r: &bolus_config::SampleRow) -> Self {
        Self {
            timestamp: r.timestamp,
            glucose: r.glucose,
            iob: r.iob,
        }
    }
}
