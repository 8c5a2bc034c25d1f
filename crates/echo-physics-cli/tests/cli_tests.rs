// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn cli(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("echo-physics").expect("binary built");
    cmd.arg("--config-dir").arg(config_dir.path());
    cmd
}

fn stdout_of(cmd: &mut Command) -> Vec<u8> {
    cmd.assert().success().get_output().stdout.clone()
}

fn report(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is a JSON report")
}

#[test]
fn ccd_run_reports_a_passing_scene() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = stdout_of(cli(&dir).args(["run", "ccd", "--check"]));
    let report = report(&output);
    assert_eq!(report["scenario"], "ccd");
    assert_eq!(report["steps"], 30);
    assert_eq!(report["passed"], true);
    assert_eq!(report["last_step"]["step"], 30);
    let bodies = report["bodies"].as_array().expect("bodies");
    let names: Vec<_> = bodies.iter().map(|b| b["name"].clone()).collect();
    assert_eq!(names, ["wall", "bullet"]);
}

#[test]
fn broad_phase_override_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = cli(&dir)
        .args(["run", "head-on", "--steps", "5", "--broad-phase", "tree"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = report(&output);
    assert_eq!(report["broad_phase"], "AabbTree");
    assert_eq!(report["steps"], 5);
}

#[test]
fn stored_config_drives_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let json = r#"{ "broad_phase": { "kind": "AabbTree" } }"#;
    fs::write(dir.path().join("physics.json"), json).expect("write");
    let output = stdout_of(cli(&dir).args(["run", "ccd", "--steps", "1"]));
    assert_eq!(report(&output)["broad_phase"], "AabbTree");
}

#[test]
fn invalid_stored_config_fails_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let json = r#"{ "constraint_solver": { "iterations": 0 } }"#;
    fs::write(dir.path().join("physics.json"), json).expect("write");
    cli(&dir)
        .args(["run", "ccd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("constraint_solver.iterations"));
}

#[test]
fn bad_time_step_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli(&dir)
        .args(["run", "ccd", "--dt", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dt"));
}

#[test]
fn unknown_scenario_is_a_usage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli(&dir)
        .args(["run", "pinball"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn config_init_writes_defaults_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("physics.json");
    cli(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("physics.json"));
    assert!(path.is_file());

    let text = fs::read_to_string(&path).expect("read");
    let written: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(written["constraint_solver"]["iterations"], 10);

    cli(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_show_prints_the_effective_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = stdout_of(cli(&dir).args(["config", "show"]));
    let config = report(&output);
    assert_eq!(config["broad_phase"]["kind"], "SweepAndPrune");
    assert_eq!(config["island"]["linear_sleeping_threshold"], 0.3);
}
