//! The per-patient decision session (`EngineCore`).
//!
//! One call to `try_advise` runs a full cycle: trend and rise analysis, sensor
//! guard, meal state update, branch selection, deferred insulin (reserved
//! release, extended steps), early boost and the safety interlock. All state
//! that survives between cycles lives on the session; `now` is always passed in.

use chrono::{DateTime, Utc};

use bolus_traits::{LearningProfile, LearningStore, MealBucket, MealOutcomeRecord};

use crate::advice::{Advice, LearningSnapshot};
use crate::config::{ExtendedCfg, LearningCfg, MealCfg, SafetyCfg, Therapy};
use crate::error::EngineError;
use crate::learning::{self, MealOutcome, OutcomeTracker};
use crate::meal::{
    self, MealDetector, MealShape, MealState, WindowSlopes, calculate_meal_confidence,
    distinguish_meal_from_snack,
};
use crate::phase::Phase;
use crate::pipeline::{self, Correction};
use crate::reserve::{ExtendedBolusState, PendingReservedBolus, ReserveDecision, evaluate_reserved};
use crate::safety::{self, iob_hard_block, iob_reduction_factor};
use crate::sensor::{self, SensorIssue};
use crate::store_error::map_store_error;
use crate::trend;
use crate::types::{GlucoseSample, TrendMetrics};
use crate::util::local_hour;

/// Samples needed before any dosing decision.
pub const MIN_HISTORY: usize = 3;
/// Below this many carbs a rise that does not look like a meal is only watched.
pub const SMALL_RISE_CARBS: f64 = 10.0;
/// History length at which data confidence saturates.
const FULL_CONFIDENCE_SAMPLES: f64 = 6.0;

/// Unified session for both dynamic (boxed store) and generic variants.
pub struct EngineCore<St: LearningStore> {
    pub(crate) store: St,
    pub(crate) meal_cfg: MealCfg,
    pub(crate) safety_cfg: SafetyCfg,
    pub(crate) extended_cfg: ExtendedCfg,
    pub(crate) learning_cfg: LearningCfg,

    pub(crate) profile: LearningProfile,
    pub(crate) detector: MealDetector,
    pub(crate) reserved: Option<PendingReservedBolus>,
    pub(crate) extended: ExtendedBolusState,
    pub(crate) tracker: OutcomeTracker,
    pub(crate) last_bolus_at: Option<DateTime<Utc>>,
}

impl<St: LearningStore> core::fmt::Debug for EngineCore<St> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineCore")
            .field("meal_state", &self.detector.state())
            .field("reserved", &self.reserved)
            .field("extended_active", &self.extended.active)
            .field("last_bolus_at", &self.last_bolus_at)
            .field("profile_confidence", &self.profile.confidence)
            .finish_non_exhaustive()
    }
}

/// Working result of a cycle before the interlock runs.
struct Draft {
    phase: Phase,
    dose: f64,
    deliver: bool,
    meal_confidence: Option<f64>,
    notes: Vec<String>,
    /// Episode carbs covered once this dose is delivered.
    covers_carbs: Option<f64>,
    reserve: Option<PendingReservedBolus>,
    extended: Option<ExtendedBolusState>,
    /// Insulin added from deferred sources this cycle.
    deferred: f64,
    /// Reserved units released into this dose, consumed only once delivered.
    release: Option<f64>,
    /// Extended step folded into this dose, committed only once delivered.
    step: Option<f64>,
}

impl Draft {
    fn new(phase: Phase, dose: f64, deliver: bool) -> Self {
        Self {
            phase,
            dose,
            deliver,
            meal_confidence: None,
            notes: Vec::new(),
            covers_carbs: None,
            reserve: None,
            extended: None,
            deferred: 0.0,
            release: None,
            step: None,
        }
    }

    fn monitoring(confidence: f64, note: String) -> Self {
        let mut d = Self::new(Phase::Monitoring, 0.0, false);
        d.meal_confidence = Some(confidence);
        d.notes.push(note);
        d
    }

    /// Add deferred insulin. A primary dose that was not going to be
    /// delivered is informational only and is replaced.
    fn add_deferred(&mut self, units: f64, phase: Phase) {
        if !self.deliver {
            self.dose = 0.0;
            self.phase = phase;
        }
        self.dose += units;
        self.deferred += units;
        self.deliver = true;
    }
}

/// Everything a cycle derives from the history before branching.
struct CycleInputs {
    glucose: f64,
    iob: f64,
    sample_at: DateTime<Utc>,
    trend: TrendMetrics,
    slopes: WindowSlopes,
    peak: f64,
    bucket: MealBucket,
    hour: u8,
}

impl<St: LearningStore> EngineCore<St> {
    /// Run one cycle. Never fails: faults become a zero-dose `Phase::Error` advice.
    pub fn advise(
        &mut self,
        history: &[GlucoseSample],
        therapy: &Therapy,
        predicted: Option<f64>,
        now: DateTime<Utc>,
    ) -> Advice {
        match self.try_advise(history, therapy, predicted, now) {
            Ok(advice) => advice,
            Err(e) => {
                tracing::warn!(error = %e, "advice cycle failed; returning zero dose");
                Advice::safe_error(&e, self.learning_snapshot())
            }
        }
    }

    /// Run one cycle, surfacing input faults as `EngineError`.
    pub fn try_advise(
        &mut self,
        history: &[GlucoseSample],
        therapy: &Therapy,
        predicted: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Advice, EngineError> {
        validate_inputs(history, therapy, predicted)?;

        let Some(newest) = history.last().filter(|_| history.len() >= MIN_HISTORY) else {
            let mut advice = Advice::idle(
                Phase::InsufficientData,
                format!(
                    "{}: need at least {MIN_HISTORY} samples, have {}",
                    Phase::InsufficientData.label(),
                    history.len()
                ),
                data_confidence(history.len()),
                self.learning_snapshot(),
            );
            advice.predicted_peak = history.last().map_or(0.0, |s| s.glucose);
            advice.reserved_dose = self.reserved_amount();
            return Ok(advice);
        };

        let trend = trend::analyze(history);
        let slopes = meal::window_slopes(history);
        let (peak, peak_forced) = pipeline::predicted_peak(newest.glucose, predicted, &trend);
        let hour = local_hour(now, self.learning_cfg.utc_offset_min);
        let inputs = CycleInputs {
            glucose: newest.glucose,
            iob: newest.iob,
            sample_at: newest.timestamp,
            trend,
            slopes,
            peak,
            bucket: MealBucket::from_hour(u32::from(hour)),
            hour,
        };
        tracing::trace!(
            glucose = inputs.glucose,
            iob = inputs.iob,
            trend = trend.recent_trend,
            short_term = trend.short_term_trend,
            accel = trend.acceleration,
            slope30 = slopes.slope30,
            "cycle inputs"
        );

        let sensor_issue = sensor::check(history);
        let mut draft = match sensor_issue {
            Some(issue) => {
                let phase = match issue {
                    SensorIssue::CompressionLow => Phase::SafetyCompressionLow,
                    SensorIssue::JumpTooLarge | SensorIssue::Oscillation => {
                        Phase::SafetySensorError
                    }
                };
                tracing::debug!(issue = issue.describe(), "sensor guard tripped");
                let mut d = Draft::new(phase, 0.0, false);
                d.notes.push(issue.describe().to_string());
                d
            }
            None => self.primary(history, &inputs, therapy, now),
        };
        if peak_forced {
            draft
                .notes
                .push("predicted peak held at current glucose (trend not rising)".into());
        }

        if sensor_issue.is_none() {
            self.apply_early_boost(&mut draft, &inputs, therapy);
            self.apply_reserved(&mut draft, &inputs, therapy, now);
            self.apply_extended(&mut draft, &inputs, therapy, now);
        }

        Ok(self.finish(draft, &inputs, history.len(), sensor_issue, therapy, now))
    }

    /// Meal detection, outcome scoring and branch selection.
    fn primary(
        &mut self,
        history: &[GlucoseSample],
        inputs: &CycleInputs,
        therapy: &Therapy,
        now: DateTime<Utc>,
    ) -> Draft {
        self.detector.update(
            history,
            &inputs.slopes,
            now,
            &self.meal_cfg,
            self.reserved.is_some(),
        );
        for outcome in self.tracker.observe(inputs.glucose, inputs.sample_at, now) {
            self.observe_outcome(&outcome, now);
        }

        let base = pipeline::resolved_correction(inputs.glucose, therapy, &self.profile, inputs.hour);
        let correction = pipeline::calculate_correction(
            base,
            inputs.glucose,
            inputs.iob,
            inputs.peak,
            &inputs.trend,
            therapy,
            &self.safety_cfg,
        );

        if let Some(d) = self.meal_branch(inputs, &correction, therapy, now) {
            return d;
        }

        if inputs.glucose > therapy.target + self.safety_cfg.target_band {
            let mut d = Draft::new(Phase::Correction, correction.dose, correction.deliver);
            d.notes.push(format!(
                "{:.1} mmol/L above target {:.1}",
                inputs.glucose - therapy.target,
                therapy.target
            ));
            d.notes.extend(correction.notes.iter().map(|n| (*n).to_string()));
            if !correction.deliver {
                d.notes.push("not delivered: rise not confirmed".into());
            }
            d
        } else {
            let mut d = Draft::new(Phase::Stable, 0.0, false);
            d.notes.push(format!("glucose {:.1} within target band", inputs.glucose));
            d
        }
    }

    /// Meal branches; `None` falls through to correction handling.
    fn meal_branch(
        &mut self,
        inputs: &CycleInputs,
        correction: &Correction,
        therapy: &Therapy,
        now: DateTime<Utc>,
    ) -> Option<Draft> {
        let state = self.detector.state();
        if !matches!(
            state,
            MealState::EarlyRise | MealState::Rising | MealState::Detected
        ) || !self.detector.should_deliver_bolus(now)
        {
            return None;
        }
        let uncovered = self.detector.uncovered_carbs();
        if uncovered <= 0.0 {
            return None;
        }
        let carbs = self.detector.carbs();
        let confidence = calculate_meal_confidence(&inputs.slopes, &inputs.trend);
        let shape = distinguish_meal_from_snack(&inputs.slopes);

        if shape != MealShape::Meal && carbs < SMALL_RISE_CARBS {
            return Some(Draft::monitoring(
                confidence,
                format!("uncertain small rise ({carbs:.0} g, {shape:?})"),
            ));
        }
        if confidence <= self.meal_cfg.min_confidence {
            return Some(Draft::monitoring(
                confidence,
                format!("meal confidence {confidence:.2} too low"),
            ));
        }

        let g = inputs.glucose;
        if g > therapy.target {
            if carbs < self.meal_cfg.min_carbs_above_target {
                return Some(Draft::monitoring(
                    confidence,
                    format!("estimated {carbs:.0} g below meal minimum"),
                ));
            }
            if !correction.deliver {
                return None;
            }
            let staged = pipeline::calculate_staged_bolus(
                uncovered,
                g,
                confidence,
                therapy,
                &self.profile,
                inputs.bucket,
            );
            if let Some(hold) = self.hold_for_reservation(confidence, uncovered, staged.reserved) {
                return Some(hold);
            }
            let top_up = pipeline::MEAL_CORRECTION_SHARE * correction.dose;
            let mut d = Draft::new(Phase::MealBolus, 0.0, true);
            d.notes.push(format!(
                "{} {uncovered:.0} g: immediate {:.2} U + correction {top_up:.2} U, reserving {:.2} U",
                state.tag(),
                staged.immediate,
                staged.reserved
            ));
            d.reserve = reservation(staged.reserved, uncovered, Phase::MealBolus, now);
            d.dose = self.maybe_split(&mut d, staged.immediate, now) + top_up;
            d.meal_confidence = Some(confidence);
            d.covers_carbs = Some(carbs);
            Some(d)
        } else {
            if carbs < self.meal_cfg.min_carbs_below_target {
                return Some(Draft::monitoring(
                    confidence,
                    format!("estimated {carbs:.0} g below meal minimum at target"),
                ));
            }
            let factor = iob_reduction_factor(inputs.iob, therapy.max_iob);
            let staged = pipeline::calculate_staged_bolus(
                uncovered,
                g,
                confidence,
                therapy,
                &self.profile,
                inputs.bucket,
            );
            let immediate = staged.immediate * factor;
            let rest = staged.reserved * factor;
            if let Some(hold) = self.hold_for_reservation(confidence, uncovered, rest) {
                return Some(hold);
            }
            let mut d = Draft::new(Phase::MealBelowTarget, 0.0, true);
            d.notes.push(format!(
                "{} {uncovered:.0} g: immediate {immediate:.2} U, reserving {rest:.2} U",
                state.tag()
            ));
            if factor < 1.0 {
                d.notes.push(format!("IOB reduction x{factor:.2}"));
            }
            d.reserve = reservation(rest, uncovered, Phase::MealBelowTarget, now);
            d.dose = self.maybe_split(&mut d, immediate, now);
            d.meal_confidence = Some(confidence);
            d.covers_carbs = Some(carbs);
            Some(d)
        }
    }

    /// Only one reservation may be pending and it never grows, so a staged
    /// bolus that would park a second one waits until the first is released
    /// or cleared. Its carbs stay uncovered in the meantime.
    fn hold_for_reservation(&self, confidence: f64, uncovered: f64, rest: f64) -> Option<Draft> {
        let pending = self.reserved.as_ref()?;
        if rest <= 0.0 {
            return None;
        }
        Some(Draft::monitoring(
            confidence,
            format!(
                "{uncovered:.0} g uncovered, waiting on reserved {:.2} U",
                pending.amount
            ),
        ))
    }

    /// Split a large immediate meal portion into extended steps. Returns the
    /// part to give now.
    fn maybe_split(&self, draft: &mut Draft, immediate: f64, now: DateTime<Utc>) -> f64 {
        let cfg = &self.extended_cfg;
        if !cfg.enabled || self.extended.active || immediate <= cfg.split_above {
            return immediate;
        }
        let (first, state) = ExtendedBolusState::start(immediate, cfg.steps, now);
        draft.notes.push(format!(
            "extended over {} steps of {first:.2} U",
            cfg.steps
        ));
        draft.extended = Some(state);
        first
    }

    fn apply_early_boost(&self, draft: &mut Draft, inputs: &CycleInputs, therapy: &Therapy) {
        if !matches!(draft.phase, Phase::MealBolus | Phase::Correction) {
            return;
        }
        if let Some(boosted) = pipeline::early_boost(
            draft.dose,
            inputs.glucose,
            inputs.peak,
            inputs.iob,
            &inputs.trend,
            therapy,
        ) {
            draft.notes.push(format!(
                "early boost {:.2} -> {boosted:.2} U (peak {:.1})",
                draft.dose, inputs.peak
            ));
            draft.dose = boosted;
        }
    }

    fn apply_reserved(
        &mut self,
        draft: &mut Draft,
        inputs: &CycleInputs,
        therapy: &Therapy,
        now: DateTime<Utc>,
    ) {
        let Some(pending) = self.reserved.as_ref() else {
            return;
        };
        if iob_hard_block(inputs.iob, therapy.max_iob, inputs.trend.recent_trend) {
            draft.notes.push("reserved bolus held by IOB limit".into());
            return;
        }
        match evaluate_reserved(
            pending,
            inputs.glucose,
            &inputs.trend,
            therapy.target,
            now,
            self.last_bolus_at,
            &self.safety_cfg,
        ) {
            ReserveDecision::Release(amount) => {
                tracing::debug!(amount, "reserved bolus released");
                draft.notes.push(format!("released reserved {amount:.2} U"));
                draft.add_deferred(amount, Phase::ReservedRelease);
                draft.release = Some(amount);
            }
            ReserveDecision::Clear(reason) => {
                tracing::debug!(reason, "reserved bolus cleared");
                draft.notes.push(format!("reserved bolus cleared: {reason}"));
                self.reserved = None;
            }
            ReserveDecision::Keep => {}
        }
    }

    fn apply_extended(
        &mut self,
        draft: &mut Draft,
        inputs: &CycleInputs,
        therapy: &Therapy,
        now: DateTime<Utc>,
    ) {
        if !self.extended.active {
            return;
        }
        let trend = inputs.trend.recent_trend;
        if let Some(reason) = self.extended.cancel_reason(
            inputs.glucose,
            trend,
            therapy.target,
            self.safety_cfg.target_band,
            now,
        ) {
            tracing::debug!(reason, "extended bolus cancelled");
            draft.notes.push(format!("extended bolus cancelled: {reason}"));
            self.extended.cancel();
            return;
        }
        let near_peak = self.detector.state() == MealState::Peak
            || (trend <= 0.0 && inputs.peak - inputs.glucose < 0.5);
        if near_peak && self.extended.halve_near_peak() {
            draft.notes.push("extended remainder halved near peak".into());
        }
        if iob_hard_block(inputs.iob, therapy.max_iob, trend) {
            return;
        }
        if let Some(step) = self.extended.next_step(
            inputs.iob,
            therapy.max_iob,
            self.extended_cfg.step_interval_min,
            now,
        ) {
            draft.notes.push(format!("extended step {step:.2} U"));
            draft.add_deferred(step, Phase::ExtendedStep);
            draft.step = Some(step);
        }
    }

    /// Run the interlock, commit state for delivered doses and assemble the advice.
    fn finish(
        &mut self,
        mut draft: Draft,
        inputs: &CycleInputs,
        samples: usize,
        sensor_issue: Option<SensorIssue>,
        therapy: &Therapy,
        now: DateTime<Utc>,
    ) -> Advice {
        let lock = safety::apply(
            draft.dose,
            draft.deliver,
            inputs.iob,
            inputs.trend.recent_trend,
            therapy,
            &self.safety_cfg,
        );
        if lock.hard_blocked {
            if !draft.phase.is_sensor_fault() {
                draft.phase = Phase::SafetyIobLimit;
            }
            draft.notes.push(format!(
                "IOB {:.2} U at limit with trend {:.2}",
                inputs.iob, inputs.trend.recent_trend
            ));
        } else if draft.deliver && lock.below_floor {
            draft
                .notes
                .push(format!("{:.2} U below deliverable minimum", lock.dose));
        }

        if lock.deliver {
            self.last_bolus_at = Some(now);
            if let Some(carbs) = draft.covers_carbs {
                self.detector.mark_covered(carbs);
                self.tracker.record_meal(
                    self.detector.episode_started_at().unwrap_or(now),
                    carbs,
                    lock.dose,
                    self.detector.start_glucose(),
                    inputs.glucose,
                    now,
                );
            } else if draft.deferred > 0.0 {
                self.tracker.add_insulin(lock.dose);
            }
            self.commit_deferred(&mut draft, lock.held_back, now);
            if let Some(r) = draft.reserve.take() {
                self.reserved = Some(r);
            }
            if let Some(ext) = draft.extended.take() {
                self.extended = ext;
            }
        } else if draft.release.is_some() || draft.step.is_some() {
            draft.notes.push("deferred insulin not given, kept pending".into());
        }

        let phase = draft.phase;
        let confidence = draft
            .meal_confidence
            .unwrap_or_else(|| data_confidence(samples));
        let rationale = format!("{}: {}", phase.label(), draft.notes.join("; "));
        tracing::debug!(
            phase = phase.tag(),
            dose = lock.dose,
            deliver = lock.deliver,
            "advice"
        );

        Advice {
            dose: lock.dose,
            rationale,
            confidence,
            predicted_peak: inputs.peak,
            meal_detected: self.detector.is_active(),
            detected_carbs: self.detector.carbs(),
            should_deliver: lock.deliver,
            phase,
            reserved_dose: self.reserved_amount(),
            carbs_on_board: self
                .tracker
                .carbs_on_board(now, self.meal_cfg.absorption_min),
            meal_state: self.detector.state(),
            sensor_issue,
            learning: self.learning_snapshot(),
        }
    }

    /// Consume the released reservation and the extended step of a delivered
    /// dose. Deferred insulin is the last part added, so units held back by
    /// the `max_bolus` clamp come out of it first and stay pending.
    fn commit_deferred(&mut self, draft: &mut Draft, mut held_back: f64, now: DateTime<Utc>) {
        if let Some(step) = draft.step {
            let cut = held_back.min(step);
            held_back -= cut;
            let fraction = if step > 0.0 { (step - cut) / step } else { 1.0 };
            self.extended.commit_step(fraction, now);
            if cut > 1e-9 {
                draft
                    .notes
                    .push(format!("max bolus held back {cut:.2} U of extended step"));
            }
        }
        if let Some(amount) = draft.release {
            let cut = held_back.min(amount);
            match self.reserved.as_mut() {
                Some(pending) if cut > 1e-9 => {
                    pending.amount = cut;
                    draft
                        .notes
                        .push(format!("max bolus held back {cut:.2} U of reserved, kept pending"));
                }
                _ => self.reserved = None,
            }
        }
    }

    /// Score an observed meal outcome into the profile and persist both.
    /// Store failures are logged and do not fail the call.
    pub fn observe_outcome(
        &mut self,
        outcome: &MealOutcome,
        now: DateTime<Utc>,
    ) -> Option<MealOutcomeRecord> {
        let record = learning::apply_outcome(&mut self.profile, outcome, now, &self.learning_cfg)?;
        if let Err(e) = self.store.save(&self.profile) {
            let err = map_store_error(&*e);
            tracing::warn!(error = %err, "saving learning profile failed");
        }
        if let Err(e) = self.store.save_outcome(&record) {
            let err = map_store_error(&*e);
            tracing::warn!(error = %err, "saving meal outcome failed");
        }
        Some(record)
    }

    /// Replace the profile with defaults, drop stored outcomes and persist
    /// the defaults.
    pub fn reset_learning(&mut self) -> Result<(), EngineError> {
        self.profile = LearningProfile::default();
        self.store.clear().map_err(|e| map_store_error(&*e))?;
        self.store.save(&self.profile).map_err(|e| map_store_error(&*e))
    }

    /// Clear the meal episode and any deferred insulin. The learning profile,
    /// outcome tracking and bolus spacing are kept.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.reserved = None;
        self.extended.cancel();
    }

    pub fn profile(&self) -> &LearningProfile {
        &self.profile
    }

    pub fn learning_snapshot(&self) -> LearningSnapshot {
        LearningSnapshot::from(&self.profile)
    }

    pub fn meal_state(&self) -> MealState {
        self.detector.state()
    }

    pub fn detector(&self) -> &MealDetector {
        &self.detector
    }

    pub fn reserved(&self) -> Option<&PendingReservedBolus> {
        self.reserved.as_ref()
    }

    fn reserved_amount(&self) -> f64 {
        self.reserved.as_ref().map_or(0.0, |r| r.amount)
    }

    pub fn extended(&self) -> &ExtendedBolusState {
        &self.extended
    }

    pub fn last_bolus_at(&self) -> Option<DateTime<Utc>> {
        self.last_bolus_at
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut St {
        &mut self.store
    }
}

fn reservation(
    amount: f64,
    carbs: f64,
    phase: Phase,
    now: DateTime<Utc>,
) -> Option<PendingReservedBolus> {
    (amount > 0.0).then_some(PendingReservedBolus {
        amount,
        carbs,
        reserved_at: now,
        phase,
    })
}

fn data_confidence(samples: usize) -> f64 {
    (samples as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0)
}

fn validate_inputs(
    history: &[GlucoseSample],
    therapy: &Therapy,
    predicted: Option<f64>,
) -> Result<(), EngineError> {
    if !(therapy.target.is_finite() && therapy.target > 0.0) {
        return Err(EngineError::InvalidTherapy("target must be a positive number"));
    }
    if !therapy.isf.is_finite() {
        return Err(EngineError::InvalidTherapy("isf must be finite"));
    }
    if !(therapy.carb_ratio.is_finite() && therapy.carb_ratio > 0.0) {
        return Err(EngineError::InvalidTherapy("carb_ratio must be > 0"));
    }
    if !(therapy.max_bolus.is_finite() && therapy.max_bolus > 0.0) {
        return Err(EngineError::InvalidTherapy("max_bolus must be > 0"));
    }
    if !(therapy.max_iob.is_finite() && therapy.max_iob > 0.0) {
        return Err(EngineError::InvalidTherapy("max_iob must be > 0"));
    }
    if !(therapy.aggressiveness_pct.is_finite() && therapy.aggressiveness_pct >= 0.0) {
        return Err(EngineError::InvalidTherapy("aggressiveness_pct must be >= 0"));
    }
    if !therapy.dose_reduction_pct.is_finite() {
        return Err(EngineError::InvalidTherapy("dose_reduction_pct must be finite"));
    }
    for (i, s) in history.iter().enumerate() {
        if !s.glucose.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "sample {i}: glucose is not finite"
            )));
        }
        if !s.iob.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "sample {i}: iob is not finite"
            )));
        }
    }
    if predicted.is_some_and(|p| !p.is_finite()) {
        return Err(EngineError::InvalidInput(
            "predicted value is not finite".into(),
        ));
    }
    Ok(())
}
