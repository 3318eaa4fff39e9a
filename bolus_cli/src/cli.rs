//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "bolus", version, about = "Bolus decision engine CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/bolus_config.toml")]
    pub config: PathBuf,

    /// Learning store directory; overrides learning.store_dir from the config
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Print JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every prefix of a glucose history through the engine, one advice per reading
    Replay {
        /// History CSV with headers timestamp,glucose,iob
        #[arg(long, value_name = "FILE")]
        samples: PathBuf,
        /// Pass `glucose + RISE` as the predicted value on each cycle
        #[arg(long, value_name = "MMOL")]
        predicted_rise: Option<f64>,
        /// Readings handed to the engine per cycle (newest last)
        #[arg(long, value_name = "N", default_value_t = 48)]
        window: usize,
        /// Only print cycles that deliver insulin
        #[arg(long, action = ArgAction::SetTrue)]
        delivered_only: bool,
    },
    /// Show the stored learning profile
    Profile {
        /// Replace the profile with defaults
        #[arg(long, action = ArgAction::SetTrue)]
        reset: bool,
    },
    /// Validate config and store, then run a synthetic cycle
    SelfCheck,
}
