//! Deferred insulin: the reserved remainder of a staged meal bolus and the
//! stepped delivery of large immediate portions.

use chrono::{DateTime, Utc};

use crate::config::SafetyCfg;
use crate::phase::Phase;
use crate::types::TrendMetrics;
use crate::util::minutes_between;

pub const RESERVE_MAX_AGE_MIN: f64 = 60.0;
/// Age after which a reservation without a confirmed rise is dropped.
pub const RESERVE_CONFIRM_MIN: f64 = 15.0;
pub const RELEASE_MIN_TREND: f64 = 0.5;

/// The parked remainder of a staged meal bolus. At most one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReservedBolus {
    pub amount: f64,
    pub carbs: f64,
    pub reserved_at: DateTime<Utc>,
    /// Phase that created the reservation.
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReserveDecision {
    Keep,
    Clear(&'static str),
    Release(f64),
}

/// Decide what happens to a pending reservation this cycle.
pub fn evaluate_reserved(
    pending: &PendingReservedBolus,
    glucose: f64,
    trend: &TrendMetrics,
    target: f64,
    now: DateTime<Utc>,
    last_bolus_at: Option<DateTime<Utc>>,
    cfg: &SafetyCfg,
) -> ReserveDecision {
    let age = minutes_between(pending.reserved_at, now);
    if age > RESERVE_MAX_AGE_MIN {
        return ReserveDecision::Clear("reservation expired");
    }
    let rising = glucose > target
        && trend.recent_trend > RELEASE_MIN_TREND
        && trend.short_term_trend > 0.0;
    let spaced = last_bolus_at.is_none_or(|t| minutes_between(t, now) >= cfg.min_bolus_interval_min);
    if rising && spaced {
        return ReserveDecision::Release(pending.amount);
    }
    if age >= RESERVE_CONFIRM_MIN && (trend.recent_trend <= 0.0 || glucose <= target) {
        return ReserveDecision::Clear("rise not confirmed");
    }
    ReserveDecision::Keep
}

pub const EXTENDED_CANCEL_TREND: f64 = -3.0;
pub const EXTENDED_CANCEL_GLUCOSE: f64 = 5.0;
pub const EXTENDED_MAX_MIN: f64 = 30.0;
pub const EXTENDED_IN_RANGE_MIN: f64 = 15.0;

/// A large immediate meal portion being delivered in timed steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedBolusState {
    pub active: bool,
    pub remaining_amount: f64,
    pub remaining_steps: u32,
    pub step_size: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_delivery_at: Option<DateTime<Utc>>,
    halved: bool,
}

impl ExtendedBolusState {
    /// Split `total` into `steps` equal parts. Returns the part to deliver now
    /// and the state carrying the rest.
    pub fn start(total: f64, steps: u32, now: DateTime<Utc>) -> (f64, Self) {
        let steps = steps.max(1);
        let step_size = total / f64::from(steps);
        let state = Self {
            active: steps > 1,
            remaining_amount: total - step_size,
            remaining_steps: steps - 1,
            step_size,
            started_at: Some(now),
            last_delivery_at: Some(now),
            halved: false,
        };
        (step_size, state)
    }

    /// Reason to stop early, if any.
    pub fn cancel_reason(
        &self,
        glucose: f64,
        recent_trend: f64,
        target: f64,
        band: f64,
        now: DateTime<Utc>,
    ) -> Option<&'static str> {
        if !self.active {
            return None;
        }
        let elapsed = self.started_at.map_or(0.0, |t| minutes_between(t, now));
        if recent_trend < EXTENDED_CANCEL_TREND {
            Some("glucose falling fast")
        } else if glucose < EXTENDED_CANCEL_GLUCOSE {
            Some("glucose below extended floor")
        } else if elapsed > EXTENDED_MAX_MIN {
            Some("extended window elapsed")
        } else if elapsed >= EXTENDED_IN_RANGE_MIN && glucose <= target + band {
            Some("glucose back in range")
        } else {
            None
        }
    }

    /// Halve the remaining amount and steps. Only the first call has an effect.
    pub fn halve_near_peak(&mut self) -> bool {
        if !self.active || self.halved {
            return false;
        }
        self.halved = true;
        self.remaining_amount /= 2.0;
        self.remaining_steps = self.remaining_steps.div_ceil(2).max(1);
        self.step_size = self.remaining_amount / f64::from(self.remaining_steps);
        true
    }

    /// Units due now, if the interval has passed. The step shrinks with IOB;
    /// the nominal step is what `commit_step` takes off the remaining amount.
    pub fn next_step(
        &self,
        iob: f64,
        max_iob: f64,
        interval_min: f64,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        if !self.active {
            return None;
        }
        if let Some(last) = self.last_delivery_at
            && minutes_between(last, now) < interval_min
        {
            return None;
        }
        let scale = if iob >= 0.75 * max_iob {
            0.3
        } else if iob >= 0.5 * max_iob {
            0.7
        } else {
            1.0
        };
        Some(self.nominal_step() * scale)
    }

    /// The last step carries whatever is left.
    fn nominal_step(&self) -> f64 {
        let step = if self.remaining_steps <= 1 {
            self.remaining_amount
        } else {
            self.step_size.min(self.remaining_amount)
        };
        step.max(0.0)
    }

    /// Record the step returned by `next_step` as delivered. `fraction` is
    /// the share of it that was actually given; the rest stays in the
    /// remaining amount and the step is not counted.
    pub fn commit_step(&mut self, fraction: f64, now: DateTime<Utc>) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.remaining_amount = (self.remaining_amount - self.nominal_step() * fraction).max(0.0);
        if fraction >= 1.0 - 1e-9 {
            self.remaining_steps = self.remaining_steps.saturating_sub(1);
        }
        self.last_delivery_at = Some(now);
        if self.remaining_steps == 0 || self.remaining_amount <= 1e-9 {
            self.cancel();
        }
    }

    pub fn cancel(&mut self) {
        *self = Self::default();
    }
}
