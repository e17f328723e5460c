use assert_cmd::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

const TREE_JOB: &str = r##"
name: search
startUrl: https://example.com
instructions:
  - type: step
    kind: fillInput
    target: "#q"
    valueQuery: { literal: rust }
    pressEnterAfterFill: true
  - type: condition
    predicate: { op: previousStepSucceeded }
    then:
      - type: step
        kind: readValue
        target: h1
        capture: { name: title }
      - type: step
        kind: pressButton
        target: "#next"
    else:
      - type: step
        kind: redirect
        url: https://example.com/help
"##;

const FLAT_JOB: &str = r##"{
  "name": "pager",
  "instructions": [
    { "type": "step", "kind": "pressButton", "target": "#next" },
    { "type": "condition",
      "predicate": { "op": "previousStepSucceeded" },
      "flowAction": { "jump": { "targetIndex": 0 } } }
  ]
}"##;

const INVALID_JOB: &str = r##"
name: broken
instructions:
  - type: step
    kind: redirect
    target: "#link"
    url: https://example.com
"##;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Command isolated from any user-level config file.
fn webjob(dir: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("webjob");
    let mut cmd = Command::new(bin);
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("WEBJOB_MAX_STEPS")
        .arg("--config")
        .arg(dir.join("absent.yaml"));
    cmd
}

#[test]
fn validate_reports_tree_job_summary() {
    let dir = tempfile::tempdir().unwrap();
    let job = write(dir.path(), "search.yaml", TREE_JOB);

    let assert = webjob(dir.path())
        .args(["--output", "json", "validate"])
        .arg(&job)
        .assert()
        .success();

    let summary: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["job"], "search");
    assert_eq!(summary["addressing"], "tree");
    assert_eq!(summary["instructions"], 5);
    assert_eq!(summary["top_level"], 2);
}

#[test]
fn validate_detects_flat_addressing() {
    let dir = tempfile::tempdir().unwrap();
    let job = write(dir.path(), "pager.json", FLAT_JOB);

    let assert = webjob(dir.path())
        .arg("validate")
        .arg(&job)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("addressing: flat"), "{stdout}");
    assert!(stdout.contains("instructions: 2"), "{stdout}");
}

#[test]
fn validate_rejects_redirect_with_target() {
    let dir = tempfile::tempdir().unwrap();
    let job = write(dir.path(), "broken.yaml", INVALID_JOB);

    let assert = webjob(dir.path())
        .arg("validate")
        .arg(&job)
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("not a valid job"), "{stderr}");
    assert!(stderr.contains("redirect"), "{stderr}");
}

#[test]
fn run_rejects_invalid_job_before_launching_browser() {
    let dir = tempfile::tempdir().unwrap();
    let job = write(dir.path(), "broken.yaml", INVALID_JOB);

    let assert = webjob(dir.path())
        .env("WEBJOB_CHROME", dir.path().join("no-such-chrome"))
        .arg("run")
        .arg(&job)
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("not a valid job"), "{stderr}");
    assert!(!stderr.contains("Failed to start the browser"), "{stderr}");
}

#[test]
fn run_reports_missing_job_file() {
    let dir = tempfile::tempdir().unwrap();

    let assert = webjob(dir.path())
        .arg("run")
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("Failed to read job file"), "{stderr}");
}

#[test]
fn config_reflects_file_and_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "webjob.yaml",
        "engine:\n  element_timeout_ms: 1234\nrecord_dir: runs\n",
    );

    let bin = assert_cmd::cargo::cargo_bin!("webjob");
    let assert = Command::new(bin)
        .current_dir(dir.path())
        .env("WEBJOB_MAX_STEPS", "42")
        .arg("--config")
        .arg(&config)
        .args(["--output", "json", "config"])
        .assert()
        .success();

    let effective: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(effective["engine"]["element_timeout_ms"], 1234);
    assert_eq!(effective["engine"]["max_steps"], 42);
    assert_eq!(effective["record_dir"], "runs");
}

#[test]
fn local_config_directory_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("config")).unwrap();
    write(
        &dir.path().join("config"),
        "webjob.yaml",
        "engine:\n  max_depth: 3\n",
    );

    let bin = assert_cmd::cargo::cargo_bin!("webjob");
    let assert = Command::new(bin)
        .current_dir(dir.path())
        .env_remove("WEBJOB_MAX_STEPS")
        .args(["--output", "json", "config"])
        .assert()
        .success();

    let effective: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(effective["engine"]["max_depth"], 3);
}

/// Drives a real browser; run with `WEBJOB_E2E=1 cargo test -- --ignored`.
#[test]
#[ignore]
fn run_executes_job_against_chromium() {
    if std::env::var("WEBJOB_E2E").is_err() {
        eprintln!("skipping: set WEBJOB_E2E=1 to run");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let page = "data:text/html,<input%20id='q'><h1>Hello</h1>";
    let job = write(
        dir.path(),
        "e2e.json",
        &format!(
            r##"{{
  "name": "e2e",
  "startUrl": "{page}",
  "instructions": [
    {{ "type": "step", "kind": "fillInput", "target": "#q", "valueQuery": {{ "literal": "typed" }} }},
    {{ "type": "step", "kind": "readValue", "target": "#q", "capture": {{ "name": "echo" }} }},
    {{ "type": "step", "kind": "readValue", "target": "h1", "capture": {{ "name": "title" }} }}
  ]
}}"##
        ),
    );
    let records = dir.path().join("records");

    let assert = webjob(dir.path())
        .args(["--output", "json", "run"])
        .arg(&job)
        .arg("--record-dir")
        .arg(&records)
        .assert()
        .success();

    let record: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(record["outcome"], "completed");
    assert_eq!(record["returnValues"][0]["value"], "typed");
    assert_eq!(record["returnValues"][1]["value"], "Hello");
    assert_eq!(std::fs::read_dir(&records).unwrap().count(), 1);
}
