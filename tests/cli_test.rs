//! CLI argument parsing tests
//!
//! These run the binary without a browser: every case fails or finishes
//! before a session would be opened.

#![allow(deprecated)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the feedreact binary command, isolated from the caller's environment
fn feedreact(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("feedreact").unwrap();
    cmd.current_dir(dir)
        .env_remove("YAMAP_EMAIL")
        .env_remove("YAMAP_PASSWORD")
        .env_remove("POST_COUNT_TO_PROCESS")
        .env_remove("FEEDREACT_CONFIG")
        .env_remove("FEEDREACT_TARGET_COUNT")
        .env_remove("FEEDREACT_HEADED")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--env-file")
        .arg(dir.join(".env"));
    cmd
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("feedreact"))
            .stdout(predicate::str::contains("react"))
            .stdout(predicate::str::contains("feed"));
    }

    #[test]
    fn shows_version() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("feedreact"));
    }

    #[test]
    fn react_help_lists_targets() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["react", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("timeline"))
            .stdout(predicate::str::contains("activities"))
            .stdout(predicate::str::contains("--count"));
    }
}

mod react_command {
    use super::*;

    #[test]
    fn requires_a_target() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .arg("react")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("--target"));
    }

    #[test]
    fn rejects_unknown_target() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["react", "--target", "react-everything"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid value"));
    }

    #[test]
    fn rejects_zero_count() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["react", "--target", "timeline", "--count", "0"])
            .assert()
            .code(2);
    }

    #[test]
    fn missing_target_count_is_reported() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["react", "--target", "react-timeline"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("target_count"));
    }

    #[test]
    fn non_numeric_target_count_is_reported() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .env("POST_COUNT_TO_PROCESS", "lots")
            .args(["react", "--target", "timeline"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Configuration error"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["react", "--target", "react-activities", "--count", "3"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("YAMAP_EMAIL"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn path_prints_the_given_file() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn show_merges_file_and_env_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[timeline]\nstagnant_threshold = 4\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "POST_COUNT_TO_PROCESS=7\nYAMAP_PASSWORD=hunter2\n",
        )
        .unwrap();

        feedreact(dir.path())
            .args(["--json", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"target_count\": 7"))
            .stdout(predicate::str::contains("\"stagnant_threshold\": 4"))
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn headed_flag_overrides_headless() {
        let dir = TempDir::new().unwrap();
        feedreact(dir.path())
            .args(["--headed", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("headless = false"));
    }
}
