//! Fixed-point dose arithmetic.
//!
//! Pumps deliver in 0.05 U increments, so deliverable doses are carried as an
//! integer count of steps (`i64`, 1 step = 0.05 U) at the rounding boundary.

/// Number of delivery steps per unit of insulin.
pub const STEPS_PER_UNIT: i64 = 20;

/// Quantize a dose in units to the nearest whole step.
/// Non-finite and negative values map to 0.
#[inline]
pub fn units_to_steps(u: f64) -> i64 {
    if !u.is_finite() || u <= 0.0 {
        return 0;
    }
    // f64 holds every step count we can meet exactly; clamp keeps the cast sane.
    (u * STEPS_PER_UNIT as f64).round().min(i64::MAX as f64 / 2.0) as i64
}

/// Convert a step count back to units.
#[inline]
pub fn steps_to_units(steps: i64) -> f64 {
    steps as f64 / STEPS_PER_UNIT as f64
}

/// Largest whole step count not exceeding `max_u`.
#[inline]
pub fn max_steps(max_u: f64) -> i64 {
    if !max_u.is_finite() || max_u <= 0.0 {
        return 0;
    }
    // tolerate representation error in e.g. 2.15 * 20
    (max_u * STEPS_PER_UNIT as f64 + 1e-9).floor() as i64
}

/// Round `dose` to the nearest 0.05 U without ever exceeding `max_u`.
#[inline]
pub fn round_dose(dose: f64, max_u: f64) -> f64 {
    steps_to_units(units_to_steps(dose).min(max_steps(max_u)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_and_negative_map_to_zero() {
        assert_eq!(units_to_steps(f64::NAN), 0);
        assert_eq!(units_to_steps(f64::INFINITY), 0);
        assert_eq!(units_to_steps(-1.0), 0);
    }

    #[test]
    fn rounds_to_nearest_step() {
        assert_eq!(units_to_steps(1.02), 20);
        assert_eq!(units_to_steps(1.03), 21);
        assert_eq!(round_dose(0.124, 5.0), 0.1);
        assert_eq!(round_dose(0.126, 5.0), 0.15);
    }

    #[test]
    fn never_rounds_above_max() {
        // 2.18 rounds to 2.2 which would exceed a 2.17 cap
        assert_eq!(round_dose(2.18, 2.17), 2.15);
        assert_eq!(round_dose(9.0, 2.15), 2.15);
    }

    #[test]
    fn zero_or_bad_cap_yields_zero() {
        assert_eq!(round_dose(1.0, 0.0), 0.0);
        assert_eq!(round_dose(1.0, f64::NAN), 0.0);
    }
}
