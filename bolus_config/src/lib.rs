#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and glucose history parsing for the bolus engine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The history CSV loader enforces headers and strictly increasing
//!   timestamps before any sample reaches the engine.
//!
//! All glucose values are mmol/L; insulin is in units.
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Glucose history CSV schema.
///
/// Expected headers:
/// timestamp,glucose,iob
///
/// Example:
/// timestamp,glucose,iob
/// 2024-05-01T12:00:00Z,6.1,0.0
/// 2024-05-01T12:05:00Z,6.4,0.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SampleRow {
    pub timestamp: DateTime<Utc>,
    pub glucose: f64,
    pub iob: f64,
}

/// Per-patient therapy settings fed into every cycle.
#[derive(Debug, Deserialize)]
pub struct TherapyCfg {
    pub target_mmol: f64,
    /// Glucose drop (mmol/L) per unit of insulin.
    pub isf_mmol_per_u: f64,
    /// Grams of carbohydrate covered by one unit.
    pub carb_ratio_g_per_u: f64,
    pub max_bolus_u: f64,
    pub max_iob_u: f64,
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness_pct: f64,
    #[serde(default)]
    pub dose_reduction_pct: f64,
}

fn default_aggressiveness() -> f64 {
    100.0
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MealCfg {
    /// Minimum detection confidence before any meal bolus (exclusive).
    pub min_confidence: f64,
    /// Minimum estimated carbs for a meal bolus above target.
    pub min_carbs_above_target_g: f64,
    /// Minimum estimated carbs for a meal bolus at or below target.
    pub min_carbs_below_target_g: f64,
    /// Minutes after which a detection episode expires back to NONE.
    pub episode_timeout_min: f64,
    /// Carb absorption time used for carbs-on-board.
    pub absorption_min: f64,
}

impl Default for MealCfg {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            min_carbs_above_target_g: 10.0,
            min_carbs_below_target_g: 12.0,
            episode_timeout_min: 120.0,
            absorption_min: 180.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SafetyCfg {
    /// Minimum spacing between delivered boluses for reserved releases.
    pub min_bolus_interval_min: f64,
    /// Doses below this are computed but never delivered.
    pub min_deliverable_u: f64,
    /// Projected glucose below this within two hours counts as hypo risk.
    pub hypo_threshold_mmol: f64,
    /// Width of the "in range" band above target.
    pub target_band_mmol: f64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            min_bolus_interval_min: 10.0,
            min_deliverable_u: 0.1,
            hypo_threshold_mmol: 4.0,
            target_band_mmol: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtendedCfg {
    pub enabled: bool,
    /// Immediate meal portions above this are split into steps.
    pub split_above_u: f64,
    pub steps: u32,
    pub step_interval_min: f64,
}

impl Default for ExtendedCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            split_above_u: 1.5,
            steps: 3,
            step_interval_min: 5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LearningCfg {
    /// Directory for the JSON learning store; in-memory when absent.
    pub store_dir: Option<String>,
    /// Retained outcome records.
    pub max_outcomes: usize,
    /// Expected uncovered rise per gram of carbs (mmol/L).
    pub rise_per_gram_mmol: f64,
}

impl Default for LearningCfg {
    fn default() -> Self {
        Self {
            store_dir: None,
            max_outcomes: 1000,
            rise_per_gram_mmol: 0.2,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EngineCfg {
    /// Local offset from UTC in minutes, used for hour-of-day learning.
    pub utc_offset_min: i32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub therapy: TherapyCfg,
    #[serde(default)]
    pub meal: MealCfg,
    #[serde(default)]
    pub safety: SafetyCfg,
    #[serde(default)]
    pub extended: ExtendedCfg,
    #[serde(default)]
    pub learning: LearningCfg,
    #[serde(default)]
    pub engine: EngineCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Check that history rows are usable as a chronological series.
pub fn validate_samples(rows: &[SampleRow]) -> eyre::Result<()> {
    if rows.is_empty() {
        eyre::bail!("history must contain at least one sample");
    }
    for (i, r) in rows.iter().enumerate() {
        if !r.glucose.is_finite() || r.glucose <= 0.0 {
            eyre::bail!("row {}: glucose must be a positive number", i + 2);
        }
        if !r.iob.is_finite() {
            eyre::bail!("row {}: iob must be a finite number", i + 2);
        }
    }
    for i in 1..rows.len() {
        if rows[i].timestamp <= rows[i - 1].timestamp {
            eyre::bail!(
                "history timestamps must be strictly increasing (rows {} and {})",
                i + 1,
                i + 2
            );
        }
    }
    Ok(())
}

pub fn load_samples_csv(path: &std::path::Path) -> eyre::Result<Vec<SampleRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open history CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["timestamp", "glucose", "iob"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "history CSV must have headers 'timestamp,glucose,iob', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<SampleRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    validate_samples(&rows)?;
    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Therapy
        let t = &self.therapy;
        if !(2.0..=15.0).contains(&t.target_mmol) {
            eyre::bail!("therapy.target_mmol must be in [2.0, 15.0]");
        }
        if !(t.isf_mmol_per_u > 0.0 && t.isf_mmol_per_u.is_finite()) {
            eyre::bail!("therapy.isf_mmol_per_u must be > 0");
        }
        if !(t.carb_ratio_g_per_u > 0.0 && t.carb_ratio_g_per_u.is_finite()) {
            eyre::bail!("therapy.carb_ratio_g_per_u must be > 0");
        }
        if !(t.max_bolus_u > 0.0 && t.max_bolus_u <= 25.0) {
            eyre::bail!("therapy.max_bolus_u must be in (0.0, 25.0]");
        }
        if !(t.max_iob_u > 0.0 && t.max_iob_u <= 50.0) {
            eyre::bail!("therapy.max_iob_u must be in (0.0, 50.0]");
        }
        if !(0.0..=200.0).contains(&t.aggressiveness_pct) {
            eyre::bail!("therapy.aggressiveness_pct must be in [0, 200]");
        }
        if !(0.0..=100.0).contains(&t.dose_reduction_pct) {
            eyre::bail!("therapy.dose_reduction_pct must be in [0, 100]");
        }

        // Meal
        if !(0.0..=1.0).contains(&self.meal.min_confidence) {
            eyre::bail!("meal.min_confidence must be in [0.0, 1.0]");
        }
        if self.meal.min_carbs_above_target_g < 0.0 || self.meal.min_carbs_below_target_g < 0.0 {
            eyre::bail!("meal.min_carbs_* must be >= 0");
        }
        if self.meal.episode_timeout_min <= 0.0 {
            eyre::bail!("meal.episode_timeout_min must be > 0");
        }
        if self.meal.absorption_min <= 0.0 {
            eyre::bail!("meal.absorption_min must be > 0");
        }

        // Safety
        if self.safety.min_bolus_interval_min < 0.0 {
            eyre::bail!("safety.min_bolus_interval_min must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.safety.min_deliverable_u) {
            eyre::bail!("safety.min_deliverable_u must be in [0.0, 1.0]");
        }
        if !(2.0..=6.0).contains(&self.safety.hypo_threshold_mmol) {
            eyre::bail!("safety.hypo_threshold_mmol must be in [2.0, 6.0]");
        }
        if self.safety.target_band_mmol < 0.0 {
            eyre::bail!("safety.target_band_mmol must be >= 0");
        }

        // Extended
        if self.extended.enabled {
            if self.extended.steps < 2 {
                eyre::bail!("extended.steps must be >= 2");
            }
            if self.extended.split_above_u <= 0.0 {
                eyre::bail!("extended.split_above_u must be > 0");
            }
            if self.extended.step_interval_min <= 0.0 {
                eyre::bail!("extended.step_interval_min must be > 0");
            }
        }

        // Learning
        if self.learning.max_outcomes == 0 {
            eyre::bail!("learning.max_outcomes must be >= 1");
        }
        if self.learning.rise_per_gram_mmol <= 0.0 {
            eyre::bail!("learning.rise_per_gram_mmol must be > 0");
        }

        // Engine
        if !(-14 * 60..=14 * 60).contains(&self.engine.utc_offset_min) {
            eyre::bail!("engine.utc_offset_min must be within +/- 14h");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
