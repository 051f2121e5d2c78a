//! CLI tests for `citybot init`.

use std::fs;
use std::process::Command;

use citybot::exit_codes;
use citybot::io::config::load_config;

#[test]
fn init_writes_loadable_starter_config() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("citybot init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("citybot.toml")).expect("load config");
    assert!(cfg.instances.contains_key("instance1"));
    assert!(cfg.vision.api_key.is_empty());
}

#[test]
fn init_keeps_existing_config_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("citybot.toml");
    fs::write(&path, "[cycle]\nrefresh_interval_ms = 250\n").expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("citybot init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load").cycle.refresh_interval_ms, 250);

    let status = Command::new(env!("CARGO_BIN_EXE_citybot"))
        .current_dir(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("citybot init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&path).expect("load");
    assert_ne!(cfg.cycle.refresh_interval_ms, 250);
    assert!(cfg.instances.contains_key("instance1"));
}
