//! Closed set of decision phases reported with every advice.

use core::fmt;

/// Which branch produced the advice. Program logic branches on this, never on
/// the rationale text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    InsufficientData,
    SafetySensorError,
    SafetyCompressionLow,
    SafetyIobLimit,
    Monitoring,
    MealBolus,
    MealBelowTarget,
    ReservedRelease,
    ExtendedStep,
    Correction,
    Stable,
    Error,
}

impl Phase {
    /// Stable snake_case tag for logs and JSON output.
    pub const fn tag(self) -> &'static str {
        match self {
            Phase::InsufficientData => "insufficient_data",
            Phase::SafetySensorError => "safety_sensor_error",
            Phase::SafetyCompressionLow => "safety_compression_low",
            Phase::SafetyIobLimit => "safety_iob_limit",
            Phase::Monitoring => "monitoring",
            Phase::MealBolus => "meal_bolus",
            Phase::MealBelowTarget => "meal_below_target",
            Phase::ReservedRelease => "reserved_release",
            Phase::ExtendedStep => "extended_step",
            Phase::Correction => "correction",
            Phase::Stable => "stable",
            Phase::Error => "error",
        }
    }

    /// Human label that opens the rationale text.
    pub const fn label(self) -> &'static str {
        match self {
            Phase::InsufficientData => "Insufficient data",
            Phase::SafetySensorError => "Sensor error",
            Phase::SafetyCompressionLow => "Compression low",
            Phase::SafetyIobLimit => "IOB limit",
            Phase::Monitoring => "Monitoring",
            Phase::MealBolus => "Meal bolus",
            Phase::MealBelowTarget => "Meal below target",
            Phase::ReservedRelease => "Reserved release",
            Phase::ExtendedStep => "Extended step",
            Phase::Correction => "Correction",
            Phase::Stable => "Stable",
            Phase::Error => "Error",
        }
    }

    pub const fn is_sensor_fault(self) -> bool {
        matches!(self, Phase::SafetySensorError | Phase::SafetyCompressionLow)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
