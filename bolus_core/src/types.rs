use chrono::{DateTime, Utc};

/// One CGM reading with the pump's insulin-on-board at that time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseSample {
    pub timestamp: DateTime<Utc>,
    /// mmol/L
    pub glucose: f64,
    /// units
    pub iob: f64,
}

impl GlucoseSample {
    pub fn new(timestamp: DateTime<Utc>, glucose: f64, iob: f64) -> Self {
        Self {
            timestamp,
            glucose,
            iob,
        }
    }
}

/// Rates of change derived from the history tail, in mmol/L per hour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendMetrics {
    pub recent_trend: f64,
    pub short_term_trend: f64,
    /// Change of the short-term trend per elapsed minute.
    pub acceleration: f64,
}
