//! Type-state builder for `Engine` and generic `build_engine` constructor.
//!
//! The builder enforces at compile time that a learning store is provided
//! before `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use bolus_traits::{LearningProfile, LearningStore, MealOutcomeRecord};

use crate::advice::{Advice, LearningSnapshot};
use crate::config::{ExtendedCfg, LearningCfg, MealCfg, SafetyCfg, Therapy};
use crate::core::EngineCore;
use crate::error::{BuildError, EngineError, Result};
use crate::learning::{MealOutcome, OutcomeTracker};
use crate::meal::{MealDetector, MealState};
use crate::reserve::{ExtendedBolusState, PendingReservedBolus};
use crate::store_error::map_store_error;
use crate::types::GlucoseSample;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Engine session over a boxed learning store.
pub struct Engine {
    pub(crate) inner: EngineCore<Box<dyn LearningStore>>,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine").field("inner", &self.inner).finish()
    }
}

impl Engine {
    /// Start building an Engine.
    pub fn builder() -> EngineBuilder<Missing> {
        EngineBuilder::default()
    }

    /// One decision cycle; faults become a zero-dose `Phase::Error` advice.
    pub fn advise(
        &mut self,
        history: &[GlucoseSample],
        therapy: &Therapy,
        predicted: Option<f64>,
        now: DateTime<Utc>,
    ) -> Advice {
        self.inner.advise(history, therapy, predicted, now)
    }

    pub fn try_advise(
        &mut self,
        history: &[GlucoseSample],
        therapy: &Therapy,
        predicted: Option<f64>,
        now: DateTime<Utc>,
    ) -> std::result::Result<Advice, EngineError> {
        self.inner.try_advise(history, therapy, predicted, now)
    }

    pub fn observe_outcome(
        &mut self,
        outcome: &MealOutcome,
        now: DateTime<Utc>,
    ) -> Option<MealOutcomeRecord> {
        self.inner.observe_outcome(outcome, now)
    }

    pub fn reset_learning(&mut self) -> std::result::Result<(), EngineError> {
        self.inner.reset_learning()
    }

    /// Clear the meal episode and deferred insulin.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn profile(&self) -> &LearningProfile {
        self.inner.profile()
    }

    pub fn learning_snapshot(&self) -> LearningSnapshot {
        self.inner.learning_snapshot()
    }

    pub fn meal_state(&self) -> MealState {
        self.inner.meal_state()
    }

    pub fn reserved(&self) -> Option<&PendingReservedBolus> {
        self.inner.reserved()
    }

    pub fn extended(&self) -> &ExtendedBolusState {
        self.inner.extended()
    }

    pub fn last_bolus_at(&self) -> Option<DateTime<Utc>> {
        self.inner.last_bolus_at()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Engine`. All config is validated on `build()`.
pub struct EngineBuilder<S> {
    store: Option<Box<dyn LearningStore>>,
    meal: Option<MealCfg>,
    safety: Option<SafetyCfg>,
    extended: Option<ExtendedCfg>,
    learning: Option<LearningCfg>,
    profile: Option<LearningProfile>,
    _s: PhantomData<S>,
}

impl Default for EngineBuilder<Missing> {
    fn default() -> Self {
        Self {
            store: None,
            meal: None,
            safety: None,
            extended: None,
            learning: None,
            profile: None,
            _s: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration, load the learning profile and construct an
/// `EngineCore`.
///
/// This is the single source of truth for validation and construction,
/// used by both `EngineBuilder::try_build()` and `build_engine()`.
fn validate_and_build<St: LearningStore>(
    mut store: St,
    meal: MealCfg,
    safety: SafetyCfg,
    extended: ExtendedCfg,
    learning: LearningCfg,
    profile: Option<LearningProfile>,
) -> Result<EngineCore<St>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if !(0.0..=1.0).contains(&meal.min_confidence) {
        return Err(invalid("meal.min_confidence must be in [0, 1]"));
    }
    if meal.min_carbs_above_target < 0.0 || meal.min_carbs_below_target < 0.0 {
        return Err(invalid("meal carb minimums must be >= 0"));
    }
    if !(meal.episode_timeout_min > 0.0) {
        return Err(invalid("meal.episode_timeout_min must be > 0"));
    }
    if !(meal.absorption_min > 0.0) {
        return Err(invalid("meal.absorption_min must be > 0"));
    }
    if !(safety.min_deliverable >= 0.0) {
        return Err(invalid("safety.min_deliverable must be >= 0"));
    }
    if !(safety.min_bolus_interval_min >= 0.0) {
        return Err(invalid("safety.min_bolus_interval_min must be >= 0"));
    }
    if !safety.hypo_threshold.is_finite() {
        return Err(invalid("safety.hypo_threshold must be finite"));
    }
    if !(safety.target_band >= 0.0) {
        return Err(invalid("safety.target_band must be >= 0"));
    }
    if extended.enabled {
        if extended.steps < 2 {
            return Err(invalid("extended.steps must be >= 2"));
        }
        if !(extended.split_above > 0.0) {
            return Err(invalid("extended.split_above must be > 0"));
        }
        if !(extended.step_interval_min > 0.0) {
            return Err(invalid("extended.step_interval_min must be > 0"));
        }
    }
    if !(learning.rise_per_gram > 0.0 && learning.rise_per_gram.is_finite()) {
        return Err(invalid("learning.rise_per_gram must be > 0"));
    }

    // ── Profile ──────────────────────────────────────────────────────────────
    let profile = match profile {
        Some(p) => p,
        None => match store.load() {
            Ok(Some(p)) => p,
            Ok(None) => LearningProfile::default(),
            Err(e) => {
                let err = map_store_error(&*e);
                tracing::warn!(error = %err, "loading learning profile failed; using defaults");
                LearningProfile::default()
            }
        },
    }
    .sanitized();

    Ok(EngineCore {
        store,
        meal_cfg: meal,
        safety_cfg: safety,
        extended_cfg: extended,
        learning_cfg: learning,
        profile,
        detector: MealDetector::new(),
        reserved: None,
        extended: ExtendedBolusState::default(),
        tracker: OutcomeTracker::new(),
        last_bolus_at: None,
    })
}

impl<S> EngineBuilder<S> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Engine> {
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let inner = validate_and_build(
            store,
            self.meal.unwrap_or_default(),
            self.safety.unwrap_or_default(),
            self.extended.unwrap_or_default(),
            self.learning.unwrap_or_default(),
            self.profile,
        )?;
        Ok(Engine { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<S> EngineBuilder<S> {
    pub fn with_meal(mut self, meal: MealCfg) -> Self {
        self.meal = Some(meal);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }
    pub fn with_extended(mut self, extended: ExtendedCfg) -> Self {
        self.extended = Some(extended);
        self
    }
    pub fn with_learning(mut self, learning: LearningCfg) -> Self {
        self.learning = Some(learning);
        self
    }
    /// Start from this profile instead of loading one from the store.
    pub fn with_profile(mut self, profile: LearningProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

// Setter that advances type-state
impl EngineBuilder<Missing> {
    pub fn with_store(self, store: impl LearningStore + 'static) -> EngineBuilder<Set> {
        EngineBuilder {
            store: Some(Box::new(store)),
            meal: self.meal,
            safety: self.safety,
            extended: self.extended,
            learning: self.learning,
            profile: self.profile,
            _s: PhantomData,
        }
    }
}

impl EngineBuilder<Set> {
    /// Validate and build the Engine. Only available once a store is set.
    pub fn build(self) -> Result<Engine> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type EngineG<St> = EngineCore<St>;

/// Build a generic, statically-dispatched `EngineG` from a concrete store.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_engine<St: LearningStore>(
    store: St,
    meal: MealCfg,
    safety: SafetyCfg,
    extended: ExtendedCfg,
    learning: LearningCfg,
) -> Result<EngineG<St>> {
    validate_and_build(store, meal, safety, extended, learning, None)
}
