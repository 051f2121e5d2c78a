//! CLI tests for `citybot run` argument and config validation.
//!
//! These never reach the device: every case fails before ADB or the
//! detection service would be contacted.

use std::process::Command;

use citybot::exit_codes;
use citybot::io::config::{CitybotConfig, write_config};

#[test]
fn run_without_api_key_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(&temp.path().join("citybot.toml"), &CitybotConfig::starter()).expect("config");

    let output = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .args(["run", "--cycles", "1"])
        .output()
        .expect("citybot run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("vision.api_key"));
    assert!(!temp.path().join("instance_states.json").exists());
}

#[test]
fn run_with_unknown_instance_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = CitybotConfig::starter();
    cfg.vision.api_key = "test-key".to_string();
    write_config(&temp.path().join("citybot.toml"), &cfg).expect("config");

    let output = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .args(["run", "--instance", "instance9"])
        .output()
        .expect("citybot run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("instance9"));
}

#[test]
fn run_with_invalid_config_file_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("citybot.toml"),
        "[cycle]\nrefresh_interval_ms = 0\n",
    )
    .expect("config");

    let status = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .arg("run")
        .status()
        .expect("citybot run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
