mod cli;
mod error_fmt;
mod profile;
mod replay;

use std::path::{Path, PathBuf};

use bolus_core::{Engine, Therapy};
use bolus_store::{JsonFileStore, MemoryStore};
use bolus_traits::LearningStore;
use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = run(cli) {
        tracing::debug!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let _ = color_eyre::install();

    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = bolus_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {e}", cli.config.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;

    init_tracing(&cli.log_level, cli.json, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let store_dir = cli
        .store_dir
        .clone()
        .or_else(|| cfg.learning.store_dir.as_ref().map(PathBuf::from));
    let mut store = open_store(store_dir.as_deref(), cfg.learning.max_outcomes)?;
    let therapy = Therapy::from(&cfg.therapy);

    match cli.cmd {
        Commands::Replay {
            samples,
            predicted_rise,
            window,
            delivered_only,
        } => {
            let mut engine = build_engine(&cfg, store)?;
            replay::run_replay(
                &mut engine,
                &therapy,
                &samples,
                predicted_rise,
                window,
                delivered_only,
                cli.json,
            )?;
        }
        Commands::Profile { reset } => {
            profile::run_profile(store.as_mut(), reset, cli.json)?;
        }
        Commands::SelfCheck => {
            // surface store faults here instead of falling back to defaults
            store
                .load()
                .map_err(|e| eyre::Report::new(bolus_core::store_error::map_store_error(&*e)))?;
            let mut engine = build_engine(&cfg, store)?;
            profile::run_self_check(&mut engine, &therapy, cli.json)?;
        }
    }
    Ok(())
}

fn open_store(dir: Option<&Path>, max_outcomes: usize) -> eyre::Result<Box<dyn LearningStore>> {
    match dir {
        Some(dir) => {
            let store = JsonFileStore::open(dir, max_outcomes)
                .wrap_err_with(|| format!("open learning store {}", dir.display()))?;
            tracing::debug!(dir = %dir.display(), "using JSON learning store");
            Ok(Box::new(store))
        }
        None => {
            tracing::debug!("no store directory configured; learning is kept in memory");
            Ok(Box::new(MemoryStore::new(max_outcomes)))
        }
    }
}

fn build_engine(cfg: &bolus_config::Config, store: Box<dyn LearningStore>) -> eyre::Result<Engine> {
    Engine::builder()
        .with_meal((&cfg.meal).into())
        .with_safety((&cfg.safety).into())
        .with_extended((&cfg.extended).into())
        .with_learning(cfg.into())
        .with_store(store)
        .build()
}

/// Console logs go to stderr (stdout carries command output); the optional
/// `[logging].file` sink is always JSON lines.
fn init_tracing(console_level: &str, json: bool, logging: &bolus_config::Logging) {
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = logging.file.as_deref().map(|path| {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "bolus.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, &name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, &name),
            _ => tracing_appender::rolling::never(dir, &name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = logging.level.as_deref().unwrap_or("info");
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
    });

    let _ = tracing_subscriber::registry().with(console).with(file).try_init();
}
