#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Bolus decision engine (storage-agnostic).
//!
//! This crate turns a glucose/IOB history into one dosing advice per cycle.
//! Persistence of the learning profile goes through `bolus_traits::LearningStore`.
//!
//! ## Architecture
//!
//! - **Trend**: recent/short-term rates and acceleration (`trend` module)
//! - **Meal detection**: 15/30-minute rise windows and the episode state machine (`meal`)
//! - **Sensor guard**: jump, compression-low and oscillation checks (`sensor`)
//! - **Pipeline**: correction, staged meal bolus and early boost (`pipeline`)
//! - **Deferred insulin**: reserved remainder and extended steps (`reserve`)
//! - **Safety**: IOB gates, confidence damping and the final interlock (`safety`)
//! - **Learning**: profile updates from scored meal outcomes (`learning`)
//! - **Session**: `EngineCore` / `Engine` and the type-state builder
//!
//! ## Units
//!
//! Glucose is mmol/L, insulin is units, trends are mmol/L per hour. Doses
//! leave the interlock as whole 0.05 U steps (`fixed_point`).

pub mod advice;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod fixed_point;
pub mod learning;
pub mod meal;
pub mod mocks;
pub mod phase;
pub mod pipeline;
pub mod reserve;
pub mod safety;
pub mod sensor;
pub mod store_error;
pub mod trend;
pub mod types;
pub mod util;

pub use crate::advice::{Advice, LearningSnapshot};
pub use crate::builder::{Engine, EngineBuilder, EngineG, Missing, Set, build_engine};
pub use crate::config::{ExtendedCfg, LearningCfg, MealCfg, SafetyCfg, Therapy};
pub use crate::core::{EngineCore, MIN_HISTORY};
pub use crate::error::{BuildError, EngineError, Report, Result};
pub use crate::learning::MealOutcome;
pub use crate::meal::{MealShape, MealState};
pub use crate::phase::Phase;
pub use crate::reserve::{ExtendedBolusState, PendingReservedBolus};
pub use crate::sensor::SensorIssue;
pub use crate::types::{GlucoseSample, TrendMetrics};
