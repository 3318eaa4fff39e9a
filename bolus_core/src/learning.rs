//! Online adaptation of the learning profile from scored meal outcomes.

use chrono::{DateTime, Utc};

use bolus_traits::{CARB_RATIO_RANGE, ISF_RANGE, LearningProfile, MealBucket, MealOutcomeRecord};

use crate::config::LearningCfg;
use crate::util::{local_hour, minutes_between};

/// Confidence half-life scale in hours (one week).
pub const CONFIDENCE_DECAY_HOURS: f64 = 168.0;
pub const CONFIDENCE_STEP: f64 = 0.1;
pub const EFFECTIVENESS_RANGE: (f64, f64) = (0.0, 2.0);

/// A meal episode whose result has been observed.
#[derive(Debug, Clone, PartialEq)]
pub struct MealOutcome {
    pub detected_at: DateTime<Utc>,
    pub peak_at: DateTime<Utc>,
    pub carbs_g: f64,
    pub insulin_u: f64,
    pub start_glucose: f64,
    pub peak_glucose: f64,
}

impl MealOutcome {
    pub fn actual_rise(&self) -> f64 {
        self.peak_glucose - self.start_glucose
    }

    pub fn time_to_peak_min(&self) -> f64 {
        minutes_between(self.detected_at, self.peak_at).max(0.0)
    }
}

/// Fold one outcome into `profile`. Returns the scored record, or `None`
/// when the outcome carries no usable signal (no expected rise).
pub fn apply_outcome(
    profile: &mut LearningProfile,
    outcome: &MealOutcome,
    now: DateTime<Utc>,
    cfg: &LearningCfg,
) -> Option<MealOutcomeRecord> {
    let pcr = profile.personal_carb_ratio;
    let expected_rise = outcome.carbs_g * cfg.rise_per_gram / pcr;
    if !(expected_rise.is_finite() && expected_rise > 0.0) {
        tracing::debug!(carbs = outcome.carbs_g, "outcome skipped: no expected rise");
        return None;
    }
    let eff = (outcome.actual_rise() / expected_rise)
        .clamp(EFFECTIVENESS_RANGE.0, EFFECTIVENESS_RANGE.1);
    // NaN rises clamp to NaN; treat as neutral
    let eff = if eff.is_finite() { eff } else { 1.0 };

    profile.personal_carb_ratio = (pcr * (0.9 + 0.2 * eff).clamp(0.7, 1.3))
        .clamp(CARB_RATIO_RANGE.0, CARB_RATIO_RANGE.1);
    profile.personal_isf = (profile.personal_isf * (0.9 + 0.1 * eff).clamp(0.8, 1.2))
        .clamp(ISF_RANGE.0, ISF_RANGE.1);

    let hour = local_hour(outcome.detected_at, cfg.utc_offset_min);
    let bucket = MealBucket::from_hour(u32::from(hour));
    let timing = profile.timing_factor(bucket);
    profile
        .meal_timing_factors
        .insert(bucket, timing * 0.95 + eff * 0.05);
    let hourly = profile.hourly_factor(hour);
    profile
        .hourly_sensitivity
        .insert(hour, hourly * 0.97 + eff * 0.03);

    let hours_since = profile
        .last_updated
        .map_or(0.0, |t| (minutes_between(t, now) / 60.0).max(0.0));
    let decayed = profile.confidence * (-hours_since / CONFIDENCE_DECAY_HOURS).exp();
    profile.confidence = (decayed + CONFIDENCE_STEP).clamp(0.0, 1.0);
    profile.total_samples += 1;
    profile.last_updated = Some(now);

    tracing::debug!(
        effectiveness = eff,
        carb_ratio = profile.personal_carb_ratio,
        isf = profile.personal_isf,
        confidence = profile.confidence,
        "learning profile updated"
    );

    Some(MealOutcomeRecord {
        detected_at: outcome.detected_at,
        scored_at: now,
        bucket,
        carbs_g: outcome.carbs_g,
        insulin_u: outcome.insulin_u,
        start_glucose: outcome.start_glucose,
        peak_glucose: outcome.peak_glucose,
        time_to_peak_min: outcome.time_to_peak_min(),
        effectiveness: eff,
    })
}

/// Minimum age before a falling meal is scored.
pub const SCORE_MIN_AGE_MIN: f64 = 30.0;
/// Fall below the running peak that marks the peak as passed.
pub const SCORE_PEAK_DROP: f64 = 0.5;
/// Age at which a meal is scored regardless of shape.
pub const SCORE_MAX_AGE_MIN: f64 = 180.0;

#[derive(Debug, Clone)]
struct TrackedMeal {
    outcome: MealOutcome,
}

/// Meals bolused by the engine, waiting for their peak to be observed,
/// plus the carb log behind carbs-on-board.
#[derive(Debug, Clone, Default)]
pub struct OutcomeTracker {
    pending: Vec<TrackedMeal>,
    carb_log: Vec<(DateTime<Utc>, f64)>,
    /// Episode start and the carbs already logged for it.
    logged_episode: Option<(DateTime<Utc>, f64)>,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Track a bolused meal. Meals are keyed by `detected_at` (the episode
    /// start): a later bolus for the same episode tops up the tracked carbs and
    /// insulin, and only the carbs not logged before reach carbs-on-board.
    pub fn record_meal(
        &mut self,
        detected_at: DateTime<Utc>,
        carbs_g: f64,
        insulin_u: f64,
        start_glucose: f64,
        glucose_now: f64,
        now: DateTime<Utc>,
    ) {
        let logged = match self.logged_episode {
            Some((at, carbs)) if at == detected_at => carbs,
            _ => 0.0,
        };
        let delta = (carbs_g - logged).max(0.0);
        self.logged_episode = Some((detected_at, logged.max(carbs_g)));
        if delta > 0.0 {
            self.carb_log.push((now, delta));
        }

        if let Some(m) = self
            .pending
            .iter_mut()
            .find(|m| m.outcome.detected_at == detected_at)
        {
            m.outcome.carbs_g += delta;
            m.outcome.insulin_u += insulin_u;
            return;
        }
        // first bolus of the episode, or the earlier one was already scored
        self.pending.push(TrackedMeal {
            outcome: MealOutcome {
                detected_at,
                peak_at: now,
                carbs_g: if logged > 0.0 { delta } else { carbs_g },
                insulin_u,
                start_glucose,
                peak_glucose: glucose_now.max(start_glucose),
            },
        });
    }

    /// Attribute insulin delivered later (reserved release, extended step)
    /// to the newest tracked meal.
    pub fn add_insulin(&mut self, units: f64) {
        if let Some(m) = self.pending.last_mut() {
            m.outcome.insulin_u += units;
        }
    }

    /// Update running peaks with the newest reading and drain the meals that
    /// are ready to score.
    pub fn observe(
        &mut self,
        glucose: f64,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<MealOutcome> {
        let mut ready = Vec::new();
        self.pending.retain_mut(|m| {
            if glucose > m.outcome.peak_glucose {
                m.outcome.peak_glucose = glucose;
                m.outcome.peak_at = at;
            }
            let age = minutes_between(m.outcome.detected_at, now);
            let passed_peak = m.outcome.peak_glucose - glucose >= SCORE_PEAK_DROP;
            if (age >= SCORE_MIN_AGE_MIN && passed_peak) || age >= SCORE_MAX_AGE_MIN {
                ready.push(m.outcome.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    /// Remaining carbs, each entry absorbed linearly over `absorption_min`.
    pub fn carbs_on_board(&mut self, now: DateTime<Utc>, absorption_min: f64) -> f64 {
        if absorption_min <= 0.0 {
            self.carb_log.clear();
            return 0.0;
        }
        self.carb_log
            .retain(|(t, _)| minutes_between(*t, now) < absorption_min);
        self.carb_log
            .iter()
            .map(|(t, carbs)| {
                let age = minutes_between(*t, now).max(0.0);
                carbs * (1.0 - age / absorption_min)
            })
            .fold(0.0, |acc, c| acc + c)
    }
}
