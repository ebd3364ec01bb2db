//! CLI tests for the `gachabot` binary.
//!
//! Spawns the binary in a temporary directory and verifies exit codes and
//! printed output for init, validate, route and a short dry run.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use gachabot::exit_codes;

fn gachabot(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gachabot"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn gachabot")
}

#[test]
fn init_writes_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = gachabot(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".gachabot/config.toml").exists());

    let second = gachabot(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::EXISTS));

    let forced = gachabot(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn validate_prints_roster_in_priority_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    gachabot(temp.path(), &["init"]);

    let output = gachabot(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ring: Home -> Grinder -> Vault (home Home)"), "{stdout}");
    let crystal = stdout.find("crystal").expect("crystal listed");
    let ytrap = stdout.find("ytrap round-robin x4").expect("group listed");
    assert!(crystal < ytrap);
}

#[test]
fn invalid_config_exits_with_invalid_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join(".gachabot");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("config.toml"),
        "home = \"Attic\"\n\n[[ring]]\nname = \"Home\"\nturns = [{ axis = \"x\", degrees = 90 }]\n",
    )
    .expect("write config");

    let output = gachabot(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn route_prints_backward_turns_negated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = gachabot(temp.path(), &["route", "Home", "Vault"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Home -> Vault: Backward"), "{stdout}");
    assert!(stdout.contains("turn X -145 (to Vault)"), "{stdout}");
}

#[test]
fn dry_run_stops_after_tick_budget() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = gachabot(temp.path(), &["run", "--max-ticks", "3"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ytrap: 3 completions"), "{stdout}");
}

#[test]
fn stop_file_shuts_the_loop_down() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join(".gachabot");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("STOP"), "").expect("stop file");

    let output = gachabot(temp.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::SHUTDOWN));
}

#[test]
fn pause_file_holds_the_loop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join(".gachabot");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.toml"), "idle_secs = 1\n").expect("write config");
    fs::write(dir.join("PAUSE"), "").expect("pause file");

    let output = gachabot(temp.path(), &["run", "--max-ticks", "1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ytrap: 0 completions"), "{stdout}");
}
