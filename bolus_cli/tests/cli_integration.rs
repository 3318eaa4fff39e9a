use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &Path) -> PathBuf {
    let toml = r#"
[therapy]
target_mmol = 6.0
isf_mmol_per_u = 2.0
carb_ratio_g_per_u = 10.0
max_bolus_u = 5.0
max_iob_u = 10.0
"#;
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_history(dir: &Path, values: &[f64]) -> PathBuf {
    let mut csv = String::from("timestamp,glucose,iob\n");
    for (i, g) in values.iter().enumerate() {
        csv.push_str(&format!("2024-05-01T12:{:02}:00Z,{g},0.0\n", 5 * i));
    }
    let path = dir.join("history.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn bolus(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bolus").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "ok", "stdout")]
#[case(&["replay"], 2, "required", "stderr")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let out = bolus(&cfg).args(args).output().unwrap();
    assert_eq!(out.status.code(), Some(exit_code), "{out:?}");
    let text = if stream == "stdout" {
        String::from_utf8_lossy(&out.stdout)
    } else {
        String::from_utf8_lossy(&out.stderr)
    };
    assert!(text.contains(needle), "missing {needle:?} in {text}");
}

#[test]
fn replay_prints_one_line_per_reading() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let csv = write_history(dir.path(), &[10.0, 10.0, 10.0, 10.0, 10.0]);
    bolus(&cfg)
        .arg("replay")
        .arg("--samples")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("insufficient_data"))
        .stdout(predicate::str::contains("correction"))
        .stdout(predicate::str::contains("replayed 5 cycles"));
}

#[test]
fn replay_json_lines_parse() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let csv = write_history(dir.path(), &[10.0, 10.0, 10.0, 10.0, 10.0]);
    let out = bolus(&cfg)
        .args(["--json", "replay", "--samples"])
        .arg(&csv)
        .output()
        .unwrap();
    assert!(out.status.success(), "{out:?}");
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["phase"], "insufficient_data");
    assert_eq!(lines[4]["phase"], "correction");
    assert_eq!(lines[4]["deliver"], false);
    assert_eq!(lines[4]["dose"], 1.4);
    assert_eq!(lines[5]["summary"]["cycles"], 5);
    assert_eq!(lines[5]["summary"]["delivered"], 0);
}

#[test]
fn replay_rejects_bad_headers() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let csv = dir.path().join("bad.csv");
    fs::write(&csv, "time,bg,iob\n2024-05-01T12:00:00Z,6.0,0\n").unwrap();
    bolus(&cfg)
        .arg("replay")
        .arg("--samples")
        .arg(&csv)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Expected 'timestamp,glucose,iob'"));
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        "[therapy]\ntarget_mmol = 6.0\nisf_mmol_per_u = 2.0\ncarb_ratio_g_per_u = 10.0\nmax_bolus_u = 0.0\nmax_iob_u = 10.0\n",
    )
    .unwrap();
    bolus(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("max_bolus_u"));
}

#[test]
fn missing_config_is_reported_as_json() {
    let dir = tempdir().unwrap();
    let out = bolus(&dir.path().join("nope.toml"))
        .args(["--json", "self-check"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&out.stderr).trim()).unwrap();
    assert_eq!(v["reason"], "Error");
    assert!(v["message"].as_str().unwrap().contains("could not be loaded"));
}

#[test]
fn profile_reset_round_trips_through_store_dir() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let store = dir.path().join("learn");

    bolus(&cfg)
        .arg("--store-dir")
        .arg(&store)
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("no stored profile"));
    fs::write(store.join("outcomes.jsonl"), "{\"stale\": true}\n").unwrap();

    bolus(&cfg)
        .arg("--store-dir")
        .arg(&store)
        .args(["profile", "--reset"])
        .assert()
        .success();
    assert!(store.join("profile.json").exists());
    assert!(!store.join("outcomes.jsonl").exists());

    let out = bolus(&cfg)
        .arg("--store-dir")
        .arg(&store)
        .args(["--json", "profile"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["stored"], true);
    assert_eq!(v["outcomes"], 0);
    assert_eq!(v["profile"]["total_samples"], 0);
}

#[test]
fn corrupt_profile_exits_with_store_code() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let store = dir.path().join("learn");
    fs::create_dir_all(&store).unwrap();
    fs::write(store.join("profile.json"), "{ not json").unwrap();

    bolus(&cfg)
        .arg("--store-dir")
        .arg(&store)
        .arg("profile")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("profile --reset"));
}
