//! Integration tests for fanout-queue publish, sweep and log

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config with a file platform ("archive") and a console platform ("stdout")
fn setup_test_env() -> (TempDir, String, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("posts.db");
    let outbox = temp_dir.path().join("outbox");

    let config_content = format!(
        r#"
[database]
path = "{}"

[platforms.archive]
kind = "file"
directory = "{}"
options = {{ channel = "main" }}

[platforms.stdout]
kind = "console"
"#,
        escape_path_for_toml(&db_path.to_string_lossy()),
        escape_path_for_toml(&outbox.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    let config_path = config_path.to_string_lossy().to_string();
    (temp_dir, config_path, outbox)
}

fn queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("fanout-queue").unwrap();
    cmd.env("FANOUT_CONFIG", config_path)
        .env_remove("FANOUT_DB_PATH");
    cmd
}

fn add(config_path: &str, args: &[&str]) -> String {
    let output = queue(config_path).arg("add").args(args).output().unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn log_json(config_path: &str, args: &[&str]) -> Vec<serde_json::Value> {
    let output = queue(config_path)
        .arg("log")
        .args(args)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_publish_to_file_platform() {
    let (_temp_dir, config_path, outbox) = setup_test_env();
    let post_id = add(&config_path, &["to the archive", "--platforms", "archive"]);

    let output = queue(&config_path)
        .args(["publish", &post_id, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["post_id"], post_id.as_str());
    assert_eq!(result["success"], true);
    let reference = result["platforms"]["archive"]["reference"].as_str().unwrap();

    let document: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(outbox.join(format!("{}.json", reference))).unwrap(),
    )
    .unwrap();
    assert_eq!(document["payload"]["text"], "to the archive");
    assert_eq!(document["payload"]["options"]["channel"], "main");
}

#[test]
fn test_publish_to_console_platform() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();
    let post_id = add(&config_path, &["printed", "--platforms", "stdout"]);

    queue(&config_path)
        .args(["publish", &post_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\":\"printed\""))
        .stdout(predicate::str::contains("Published post"))
        .stdout(predicate::str::contains("stdout: ok"));
}

#[test]
fn test_publish_twice_is_rejected() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();
    let post_id = add(&config_path, &["once only", "--platforms", "archive"]);

    queue(&config_path).args(["publish", &post_id]).assert().success();

    queue(&config_path)
        .args(["publish", &post_id])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("already published"));

    let published = log_json(&config_path, &["--post", &post_id, "--action", "post_published"]);
    assert_eq!(published.len(), 1);
}

#[test]
fn test_publish_partial_failure() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();
    let post_id = add(&config_path, &["half way", "--platforms", "archive,gopher"]);

    queue(&config_path)
        .args(["publish", &post_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive: ok"))
        .stdout(predicate::str::contains("gopher: failed (Unknown platform: gopher)"));

    queue(&config_path)
        .args(["list", "--published", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(post_id.as_str()));
}

#[test]
fn test_publish_total_failure_keeps_post_queued() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();
    let post_id = add(&config_path, &["going nowhere", "--platforms", "gopher"]);

    queue(&config_path)
        .args(["publish", &post_id])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Failed to publish post"));

    let failed = log_json(&config_path, &["--action", "post_publish_failed"]);
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0]["details"]["gopher"]["error"],
        "Unknown platform: gopher"
    );

    // Still unpublished, so it can be tried again
    queue(&config_path)
        .args(["publish", &post_id])
        .assert()
        .code(1);
}

#[test]
fn test_publish_missing_post() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();

    queue(&config_path)
        .args(["publish", "no-such-post"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_sweep_publishes_only_eligible_posts() {
    let (_temp_dir, config_path, outbox) = setup_test_env();
    add(&config_path, &["now", "--platforms", "archive"]);
    add(&config_path, &["past date", "--platforms", "archive", "--at", "2020-01-01"]);
    add(&config_path, &["future", "--platforms", "archive", "--at", "2099-01-01"]);

    queue(&config_path)
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Sweep complete: 2 published, 0 failed, 1 skipped",
        ));

    assert_eq!(fs::read_dir(&outbox).unwrap().count(), 2);

    let output = queue(&config_path)
        .args(["sweep", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["published"], 0);
    assert_eq!(summary["skipped"], 1);
}

#[test]
fn test_log_records_lifecycle() {
    let (_temp_dir, config_path, _outbox) = setup_test_env();
    let post_id = add(&config_path, &["logged", "--platforms", "archive"]);
    queue(&config_path)
        .args(["edit", &post_id, "--title", "Now titled"])
        .assert()
        .success();
    queue(&config_path).args(["publish", &post_id]).assert().success();

    let entries = log_json(&config_path, &["--post", &post_id]);
    let actions: Vec<&str> = entries
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["post_created", "post_updated", "post_published"]);
    assert_eq!(entries[1]["details"]["fields"], serde_json::json!(["title"]));
    assert_eq!(entries[2]["details"]["archive"]["success"], true);

    queue(&config_path)
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("| post_published |"));
}
