//! Integration tests for the quality-agent CLI

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const BUNDLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/bundle.json");

/// A command isolated in its own working directory and report store
fn agent(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quality-agent").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("RUST_LOG")
        .env(
            "QUALITY_AGENT_STORAGE__REPORTS_DIR",
            workdir.path().join("reports"),
        );
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("quality-agent").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Privacy-preserving data-quality reports"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("quality-agent").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quality-agent"));
}

#[test]
fn test_invalid_subcommand() {
    let mut cmd = Command::cargo_bin("quality-agent").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_generate_json_report() {
    let workdir = TempDir::new().unwrap();
    let report = json_stdout(agent(&workdir).args(["--quiet", "generate", "--bundle", BUNDLE, "--format", "json"]));

    assert_eq!(report["status"], "GENERATED");
    assert_eq!(report["numberOfEntities"], 5);

    let results = report["results"].as_array().unwrap();
    // two simple checks plus three gender strata
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r["obfuscatedValue"].is_number()));
    assert!(results.iter().all(|r| r.get("rawValue").is_none()));

    assert!(workdir.path().join("reports/report-1.json").exists());
}

#[test]
fn test_verbose_generate_keeps_json_on_stdout() {
    let workdir = TempDir::new().unwrap();
    let assert = agent(&workdir)
        .args(["-v", "generate", "--bundle", BUNDLE, "--format", "json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Running 3 checks"));

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["status"], "GENERATED");
}

#[test]
fn test_outbox_failure_warning_keeps_json_on_stdout() {
    let workdir = TempDir::new().unwrap();
    // a plain file where the outbox directory should be
    let blocked = workdir.path().join("outbox");
    std::fs::write(&blocked, "").unwrap();

    let assert = agent(&workdir)
        .env("QUALITY_AGENT_UPLOAD__ENABLED", "true")
        .env("QUALITY_AGENT_UPLOAD__OUTBOX_DIR", &blocked)
        .args(["generate", "--bundle", BUNDLE, "--format", "json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("could not be placed in the outbox"));

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["id"], 1);
}

#[test]
fn test_generate_requires_a_data_store() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .arg("generate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No data store configured"));
}

#[test]
fn test_generate_rejects_invalid_bundle() {
    let workdir = TempDir::new().unwrap();
    let bundle = workdir.path().join("broken.json");
    std::fs::write(&bundle, r#"{"resourceType": "Patient"}"#).unwrap();

    agent(&workdir)
        .arg("generate")
        .arg("--bundle")
        .arg(&bundle)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid bundle"));
}

#[test]
fn test_list_and_show_stored_reports() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .args(["--quiet", "generate", "--bundle", BUNDLE])
        .assert()
        .success();

    let listed = json_stdout(agent(&workdir).args(["list", "--format", "json"]));
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], 1);
    assert_eq!(listed[0]["results"], 5);
    assert_eq!(listed[0]["failures"], 0);

    let shown = json_stdout(agent(&workdir).args(["show", "1", "--format", "json"]));
    assert_eq!(shown["id"], 1);
    assert_eq!(shown["status"], "GENERATED");

    agent(&workdir)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Report 1"))
        .stdout(predicate::str::contains("GENERATED"));
}

#[test]
fn test_show_unknown_report() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .args(["show", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("report 99 not found"));
}

#[test]
fn test_list_without_reports() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .arg("list")
        .assert()
        .success()
        .stderr(predicate::str::contains("No reports yet"));
}

#[test]
fn test_generate_places_report_in_outbox() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .env("QUALITY_AGENT_UPLOAD__ENABLED", "true")
        .env("QUALITY_AGENT_UPLOAD__OUTBOX_DIR", workdir.path().join("outbox"))
        .args(["--quiet", "generate", "--bundle", BUNDLE])
        .assert()
        .success();

    let exported = std::fs::read_to_string(workdir.path().join("outbox/report-1.json")).unwrap();
    assert!(!exported.contains("patients"));
    assert!(exported.contains("\"numberOfEntities\": 5"));
}

#[test]
fn test_config_file_overrides() {
    let workdir = TempDir::new().unwrap();
    std::fs::write(
        workdir.path().join("quality-agent.toml"),
        "[report]\nepsilon_budget = 3.5\n",
    )
    .unwrap();

    let config = json_stdout(agent(&workdir).args(["config", "show", "--format", "json"]));
    assert_eq!(config["report"]["epsilon_budget"], 3.5);
    assert_eq!(config["runner"]["thread_percentage"], 75);
}

#[test]
fn test_invalid_config_is_rejected() {
    let workdir = TempDir::new().unwrap();
    agent(&workdir)
        .env("QUALITY_AGENT_RUNNER__THREAD_PERCENTAGE", "0")
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("thread_percentage"));
}
