//! Human-readable error descriptions and structured JSON error formatting.

use bolus_core::error::{BuildError, EngineError};
use bolus_store::StoreError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingStore => {
                "What happened: No learning store was provided to the engine.\nLikely causes: The store failed to open before the engine was built.\nHow to fix: Check learning.store_dir (or --store-dir) and rerun.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid engine configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ee) = find::<EngineError>(err) {
        return match ee {
            EngineError::InvalidTherapy(msg) => format!(
                "What happened: Therapy settings were rejected ({msg}).\nLikely causes: A zero or missing value in [therapy].\nHow to fix: Set target, ISF, carb ratio and limits to positive numbers."
            ),
            EngineError::InvalidInput(msg) => format!(
                "What happened: The glucose history was rejected ({msg}).\nLikely causes: Missing or non-numeric readings.\nHow to fix: Clean the history CSV and rerun."
            ),
            EngineError::StoreIo(msg) | EngineError::Store(msg) => format!(
                "What happened: The learning store could not be read or written ({msg}).\nLikely causes: Missing directory, permissions or a full disk.\nHow to fix: Check the store directory; the engine keeps working with defaults."
            ),
            EngineError::StoreCorrupt(msg) => format!(
                "What happened: The learning store holds unreadable data ({msg}).\nLikely causes: A partial write or manual edit.\nHow to fix: Run `bolus profile --reset` to start from defaults."
            ),
        };
    }

    if let Some(se) = find::<StoreError>(err) {
        return match se {
            StoreError::Corrupt { path, .. } => format!(
                "What happened: Learning store file {path} is corrupt.\nLikely causes: A partial write or manual edit.\nHow to fix: Run `bolus profile --reset` or remove the file."
            ),
            other => format!(
                "What happened: Learning store failed ({other}).\nLikely causes: Missing directory or permissions.\nHow to fix: Check learning.store_dir (or --store-dir)."
            ),
        };
    }

    // String-based heuristics for errors coming from config or CSV loading
    let msg = err.to_string();
    let chain = format!("{err:#}");
    let lower = chain.to_ascii_lowercase();

    if lower.contains("history csv must have headers") {
        return "Invalid headers in history CSV. Expected 'timestamp,glucose,iob'.".to_string();
    }
    if lower.contains("strictly increasing") {
        return "What happened: History timestamps are out of order.\nLikely causes: Duplicate or unsorted rows.\nHow to fix: Sort the CSV by timestamp and drop duplicates.".to_string();
    }
    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: The config file could not be loaded.\nCause: {chain}\nHow to fix: Pass --config with a valid TOML file (see etc/bolus_config.toml)."
        );
    }
    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid.\nCause: {chain}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Search the whole error chain, not just the outermost context.
fn find<E: std::error::Error + 'static>(err: &eyre::Report) -> Option<&E> {
    err.chain().find_map(|e| e.downcast_ref::<E>())
}

/// Stable exit codes: 3 input/therapy, 4 store, 5 engine build, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ee) = find::<EngineError>(err) {
        return match ee {
            EngineError::InvalidInput(_) | EngineError::InvalidTherapy(_) => 3,
            EngineError::Store(_) | EngineError::StoreIo(_) | EngineError::StoreCorrupt(_) => 4,
        };
    }
    if find::<StoreError>(err).is_some() {
        return 4;
    }
    if find::<BuildError>(err).is_some() {
        return 5;
    }
    1
}

/// Machine-readable name of the error kind.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ee) = find::<EngineError>(err) {
        return match ee {
            EngineError::InvalidInput(_) => "InvalidInput",
            EngineError::InvalidTherapy(_) => "InvalidTherapy",
            EngineError::Store(_) | EngineError::StoreIo(_) => "Store",
            EngineError::StoreCorrupt(_) => "StoreCorrupt",
        };
    }
    if let Some(se) = find::<StoreError>(err) {
        return match se {
            StoreError::Corrupt { .. } => "StoreCorrupt",
            _ => "Store",
        };
    }
    if find::<BuildError>(err).is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn engine_errors_keep_their_exit_codes_through_context() {
        let err: eyre::Report = Err::<(), _>(EngineError::InvalidTherapy("max_bolus must be > 0"))
            .wrap_err("replay failed")
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), 3);
        assert_eq!(reason_name(&err), "InvalidTherapy");
        assert!(humanize(&err).contains("max_bolus must be > 0"));
    }

    #[test]
    fn corrupt_store_is_named() {
        let err = eyre::Report::new(StoreError::Corrupt {
            path: "/tmp/x/profile.json".into(),
            reason: "eof".into(),
        });
        assert_eq!(exit_code_for_error(&err), 4);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "StoreCorrupt");
        assert!(v["message"].as_str().unwrap().contains("profile.json"));
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert_eq!(reason_name(&err), "Error");
        assert!(humanize(&err).contains("Original: boom"));
    }
}
