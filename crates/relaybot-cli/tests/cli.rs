use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::{contains, starts_with};
use std::path::Path;
use tempfile::TempDir;

const DIRECTORY: &str = r#"
[bot]
user_id = "UBOT"

[[channels]]
id = "C1"
name = "general"

[[direct_messages]]
id = "D1"
user = "U1"

[[users]]
id = "U1"
name = "alice"
"#;

fn relaybot(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("relaybot"));
    cmd.env("RELAYBOT_DIR", data_dir).env_remove("RELAYBOT_CONFIG");
    cmd
}

/// Config, directory and data dir in one temp dir; returns the config path
fn workspace(config: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(temp_dir.path().join("directory.toml"), DIRECTORY).unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, config).unwrap();
    (temp_dir, config_path)
}

const CONFIG: &str = r#"
[bot]
poll_interval_ms = 10

[routes]
general = ["example"]
__direct_message__ = ["example", "example2"]

[queue]
path = "queue.redb"
ack_policy = "after_process"

[platform]
directory = "directory.toml"
"#;

#[test]
fn test_cli_help() {
    let temp_dir = tempfile::tempdir().unwrap();
    relaybot(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Relaybot"));
}

#[test]
fn test_cli_version() {
    let temp_dir = tempfile::tempdir().unwrap();
    relaybot(temp_dir.path()).arg("--version").assert().success();
}

#[test]
fn test_cli_completions() {
    let temp_dir = tempfile::tempdir().unwrap();
    relaybot(temp_dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(starts_with("_relaybot"));
}

#[test]
fn test_check_prints_commands_and_routes() {
    let (temp_dir, config_path) = workspace(CONFIG);
    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("check")
        .assert()
        .success()
        .stdout(contains("example2"))
        .stdout(contains("example::queue"))
        .stdout(contains("general -> example"))
        .stdout(contains("Configuration OK"));
}

#[test]
fn test_check_requires_ack_policy() {
    let (temp_dir, config_path) = workspace(
        r#"
[queue]
max_attempts = 3

[platform]
directory = "directory.toml"
"#,
    );
    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("ack_policy"));
}

#[test]
fn test_check_rejects_unknown_route_command() {
    let (temp_dir, config_path) = workspace(&CONFIG.replace(
        "general = [\"example\"]",
        "general = [\"missing\"]",
    ));
    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("unknown command `missing`"));
}

#[test]
fn test_missing_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    relaybot(temp_dir.path())
        .arg("--config")
        .arg(temp_dir.path().join("nope.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("Config file not found"));
}

#[test]
fn test_listen_answers_events_from_file() {
    let (temp_dir, config_path) = workspace(CONFIG);
    let events = temp_dir.path().join("events.jsonl");
    std::fs::write(
        &events,
        concat!(
            r#"{"type":"message","channel":"C1","user":"U1","text":"test hello","ts":"1.0"}"#,
            "\n",
            r#"{"type":"message","channel":"D1","user":"U1","text":"example2","ts":"2.0"}"#,
            "\n",
            r#"{"type":"message","channel":"C1","user":"UBOT","text":"test loop","ts":"3.0"}"#,
            "\n",
        ),
    )
    .unwrap();

    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["listen", "--events"])
        .arg(&events)
        .assert()
        .success()
        .stdout(contains(r#""text":"Test value is: hello""#))
        .stdout(contains(r#""text":"This is from example 2""#))
        .stdout(contains("Test value is: loop").not());
}

#[test]
fn test_listen_offloads_to_queue() {
    let (temp_dir, config_path) = workspace(CONFIG);
    let events = temp_dir.path().join("events.jsonl");
    std::fs::write(
        &events,
        r#"{"type":"message","channel":"C1","user":"U1","text":"<@UBOT> queue abc","ts":"1.0"}"#,
    )
    .unwrap();

    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["listen", "--events"])
        .arg(&events)
        .assert()
        .success();

    relaybot(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("check")
        .assert()
        .success()
        .stdout(contains("1 pending"));
}
