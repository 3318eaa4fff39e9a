//! Unannounced meal detection.
//!
//! `window_slopes` condenses the history tail into 15/30-minute rise metrics;
//! `MealDetector` turns those into a monotonic per-episode state machine with
//! a carb estimate.

use chrono::{DateTime, Utc};

use crate::config::MealCfg;
use crate::types::{GlucoseSample, TrendMetrics};
use crate::util::{minutes_between, per_hour};

/// Minutes an EARLY_RISE may wait for confirmation before it is dropped.
pub const EARLY_RISE_WINDOW_MIN: f64 = 15.0;
pub const RISING_WINDOW_MIN: f64 = 30.0;
pub const DETECTED_WINDOW_MIN: f64 = 60.0;

/// Ordered by progression within one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealState {
    #[default]
    None,
    EarlyRise,
    Rising,
    Detected,
    Peak,
    Declining,
}

impl MealState {
    pub const fn tag(self) -> &'static str {
        match self {
            MealState::None => "none",
            MealState::EarlyRise => "early_rise",
            MealState::Rising => "rising",
            MealState::Detected => "detected",
            MealState::Peak => "peak",
            MealState::Declining => "declining",
        }
    }

    /// Minutes after entering this state during which a bolus may be given.
    pub const fn delivery_window_min(self) -> Option<f64> {
        match self {
            MealState::EarlyRise => Some(EARLY_RISE_WINDOW_MIN),
            MealState::Rising => Some(RISING_WINDOW_MIN),
            MealState::Detected => Some(DETECTED_WINDOW_MIN),
            MealState::None | MealState::Peak | MealState::Declining => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealShape {
    Meal,
    Snack,
    Uncertain,
}

/// Rise over the last 15 and 30 minutes, measured from the window's oldest
/// reading to the mean of the two newest readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSlopes {
    pub slope15: f64,
    pub slope30: f64,
    pub delta15: f64,
    pub delta30: f64,
    /// Share of rising steps inside the 30-minute window.
    pub rising_fraction: f64,
    /// Oldest reading of the 30-minute window.
    pub baseline30: f64,
}

fn baseline_index(history: &[GlucoseSample], window_min: f64) -> usize {
    let n = history.len();
    let newest = history[n - 1].timestamp;
    history
        .iter()
        .position(|s| minutes_between(s.timestamp, newest) <= window_min)
        .unwrap_or(n - 1)
}

pub fn window_slopes(history: &[GlucoseSample]) -> WindowSlopes {
    let n = history.len();
    if n < 3 {
        return WindowSlopes::default();
    }
    let newest = &history[n - 1];
    let prev = &history[n - 2];
    let level = (newest.glucose + prev.glucose) / 2.0;
    let level_at = prev.timestamp + (newest.timestamp - prev.timestamp) / 2;

    let over = |base: usize| -> (f64, f64) {
        // the level already averages the two newest readings
        if base + 2 >= n {
            return (0.0, 0.0);
        }
        let minutes = minutes_between(history[base].timestamp, level_at);
        if minutes <= 0.0 {
            return (0.0, 0.0);
        }
        let delta = level - history[base].glucose;
        (per_hour(delta, minutes), delta)
    };

    let base15 = baseline_index(history, 15.0);
    let base30 = baseline_index(history, 30.0);
    let (slope15, delta15) = over(base15);
    let (slope30, delta30) = over(base30);

    let steps = n - 1 - base30;
    let rising = history[base30..]
        .windows(2)
        .filter(|w| w[1].glucose > w[0].glucose)
        .count();
    let rising_fraction = if steps > 0 {
        rising as f64 / steps as f64
    } else {
        0.0
    };

    WindowSlopes {
        slope15,
        slope30,
        delta15,
        delta30,
        rising_fraction,
        baseline30: history[base30].glucose,
    }
}

/// Strongest matching rise tier and its carb estimate in grams.
pub fn classify(s: &WindowSlopes) -> Option<(MealState, f64)> {
    if s.slope30 > 2.0 && s.delta30 > 1.2 {
        Some((MealState::Rising, 14.0))
    } else if s.slope30 > 1.8 && s.delta30 > 1.0 {
        Some((MealState::Rising, 10.0))
    } else if s.slope30 > 1.2 && s.delta30 > 0.7 {
        Some((MealState::Rising, 6.0))
    } else if s.slope30 > 1.2 && s.slope15 > 1.8 && s.delta15 > 0.4 {
        // 40 % of a nominal 20 g meal until the rise is confirmed
        Some((MealState::EarlyRise, 20.0 * 0.4))
    } else {
        None
    }
}

/// Confidence in [0, 1] that the current rise is a meal.
pub fn calculate_meal_confidence(s: &WindowSlopes, trend: &TrendMetrics) -> f64 {
    let slope = (s.slope30 / 3.0).clamp(0.0, 1.0);
    let size = (s.delta30 / 1.5).clamp(0.0, 1.0);
    let consistency = s.rising_fraction.clamp(0.0, 1.0);
    let accel = if trend.acceleration > 0.0 { 1.0 } else { 0.0 };
    (0.3 * slope + 0.3 * size + 0.3 * consistency + 0.1 * accel).clamp(0.0, 1.0)
}

pub fn distinguish_meal_from_snack(s: &WindowSlopes) -> MealShape {
    if s.delta30 >= 1.0 || (s.slope30 >= 1.8 && s.rising_fraction >= 0.75) {
        MealShape::Meal
    } else if s.delta30 < 0.7 && s.slope15 < 1.8 {
        MealShape::Snack
    } else {
        MealShape::Uncertain
    }
}

/// Per-episode meal state. One episode runs from the first classified rise
/// until it expires or is reset.
#[derive(Debug, Clone, Default)]
pub struct MealDetector {
    state: MealState,
    carbs: f64,
    covered_carbs: f64,
    episode_started_at: Option<DateTime<Utc>>,
    state_entered_at: Option<DateTime<Utc>>,
    start_glucose: f64,
}

impl MealDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MealState {
        self.state
    }

    /// Estimated carbs for the current episode (grams).
    pub fn carbs(&self) -> f64 {
        self.carbs
    }

    /// Carbs of this episode not yet covered by a meal bolus.
    pub fn uncovered_carbs(&self) -> f64 {
        (self.carbs - self.covered_carbs).max(0.0)
    }

    pub fn mark_covered(&mut self, carbs: f64) {
        self.covered_carbs = self.covered_carbs.max(carbs).min(self.carbs);
    }

    pub fn episode_started_at(&self) -> Option<DateTime<Utc>> {
        self.episode_started_at
    }

    pub fn start_glucose(&self) -> f64 {
        self.start_glucose
    }

    pub fn is_active(&self) -> bool {
        self.state != MealState::None
    }

    /// Clear the episode.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn enter(&mut self, state: MealState, carbs: f64, now: DateTime<Utc>) {
        tracing::debug!(
            from = self.state.tag(),
            to = state.tag(),
            carbs,
            "meal state transition"
        );
        self.state = state;
        self.carbs = self.carbs.max(carbs);
        self.state_entered_at = Some(now);
    }

    /// Advance the episode with this cycle's slopes. A new episode is not
    /// started while `reservation_pending` is true.
    pub fn update(
        &mut self,
        history: &[GlucoseSample],
        slopes: &WindowSlopes,
        now: DateTime<Utc>,
        cfg: &MealCfg,
        reservation_pending: bool,
    ) -> MealState {
        if history.is_empty() {
            return self.state;
        }

        if let Some(started) = self.episode_started_at {
            if minutes_between(started, now) >= cfg.episode_timeout_min {
                tracing::debug!(state = self.state.tag(), "meal episode expired");
                self.reset();
            }
        }

        let tier = classify(slopes);
        match self.state {
            MealState::None => {
                if let Some((state, carbs)) = tier {
                    if reservation_pending {
                        tracing::trace!("rise ignored while a reserved bolus is pending");
                    } else {
                        self.episode_started_at = Some(now);
                        self.start_glucose = slopes.baseline30;
                        self.enter(state, carbs, now);
                    }
                }
            }
            MealState::EarlyRise => match tier {
                Some((MealState::Rising, carbs)) => self.enter(MealState::Rising, carbs, now),
                _ => {
                    let since = self
                        .state_entered_at
                        .map_or(0.0, |t| minutes_between(t, now));
                    if since >= EARLY_RISE_WINDOW_MIN {
                        tracing::debug!("early rise not confirmed; false start");
                        self.reset();
                    }
                }
            },
            MealState::Rising => {
                if let Some((MealState::Rising, carbs)) = tier {
                    if carbs > self.carbs {
                        tracing::debug!(from = self.carbs, to = carbs, "meal estimate upgraded");
                        self.carbs = carbs;
                    }
                }
                if slopes.slope15 < 1.0 {
                    self.enter(MealState::Detected, self.carbs, now);
                }
            }
            MealState::Detected => {
                if slopes.slope15 <= 0.0 {
                    self.enter(MealState::Peak, self.carbs, now);
                }
            }
            MealState::Peak => {
                if slopes.slope15 < -1.0 {
                    self.enter(MealState::Declining, self.carbs, now);
                }
            }
            MealState::Declining => {}
        }
        self.state
    }

    /// True while the current state's delivery window is open.
    pub fn should_deliver_bolus(&self, now: DateTime<Utc>) -> bool {
        match (self.state.delivery_window_min(), self.state_entered_at) {
            (Some(window), Some(entered)) => minutes_between(entered, now) < window,
            _ => false,
        }
    }
}
