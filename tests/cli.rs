//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn convoy(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("convoy").unwrap();
    cmd.arg("--config").arg(tmp.path().join("config.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("convoy").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_path_uses_override() {
    let tmp = TempDir::new().unwrap();
    convoy(&tmp)
        .arg("config")
        .arg("--path")
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let tmp = TempDir::new().unwrap();
    convoy(&tmp)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));

    let written = std::fs::read_to_string(tmp.path().join("config.toml")).unwrap();
    assert!(written.contains("max_fragment_runes = 96"));

    convoy(&tmp)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_prints_effective_values() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        "[activity]\nstale_refresh_delay_ms = 4000\n",
    )
    .unwrap();

    convoy(&tmp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("stale_refresh_delay_ms = 4000"))
        .stdout(predicate::str::contains("load_debounce_ms = 40"));
}

#[test]
fn test_replay_renders_merged_transcript() {
    let tmp = TempDir::new().unwrap();
    let script = tmp.path().join("session.jsonl");
    std::fs::write(
        &script,
        concat!(
            "# focus and load\n",
            "{\"op\":\"select\",\"key\":\"session:s1\"}\n",
            "{\"op\":\"advance\",\"ms\":50}\n",
            "{\"op\":\"history\",\"session\":\"s1\",\"items\":[]}\n",
            "{\"op\":\"send\",\"text\":\"hello\"}\n",
            "{\"op\":\"stream\",\"session\":\"s1\",\"event\":{\"type\":\"agent_delta\",\"text\":\"Hi\",\"created_at\":\"2026-01-01T00:00:00Z\"}}\n",
            "{\"op\":\"stream\",\"session\":\"s1\",\"event\":{\"type\":\"agent_delta\",\"text\":\" there.\",\"created_at\":\"2026-01-01T00:00:00.300Z\"}}\n",
            "{\"op\":\"confirm\",\"token\":1}\n",
        ),
    )
    .unwrap();

    convoy(&tmp)
        .arg("replay")
        .arg(&script)
        .arg("--no-color")
        .arg("--show-sends")
        .assert()
        .success()
        .stdout(predicate::str::contains("== session:s1"))
        .stdout(predicate::str::contains("[you] hello"))
        .stdout(predicate::str::contains("[agent] Hi there."))
        .stdout(predicate::str::contains("sent #1 to s1: hello"));
}

#[test]
fn test_replay_rejects_bad_script() {
    let tmp = TempDir::new().unwrap();
    let script = tmp.path().join("bad.jsonl");
    std::fs::write(&script, "{\"op\":\"teleport\"}\n").unwrap();

    convoy(&tmp)
        .arg("replay")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn test_replay_missing_file() {
    let tmp = TempDir::new().unwrap();
    convoy(&tmp)
        .arg("replay")
        .arg(tmp.path().join("nope.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}
