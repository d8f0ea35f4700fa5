//! Integration tests for the fanout-send daemon

use assert_cmd::Command;
use libfanout::{Database, NewPost, PostFilter, Schedule};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db_path: String,
    outbox: PathBuf,
}

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config with one file platform ("archive") writing into a temp outbox
fn setup_test_env() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("posts.db");
    let outbox = temp_dir.path().join("outbox");

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduler]
interval_secs = 1

[platforms.archive]
kind = "file"
directory = "{}"
"#,
        escape_path_for_toml(&db_path.to_string_lossy()),
        escape_path_for_toml(&outbox.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        config_path: config_path.to_string_lossy().to_string(),
        db_path: db_path.to_string_lossy().to_string(),
        outbox,
        _temp_dir: temp_dir,
    }
}

fn outbox_documents(outbox: &PathBuf) -> usize {
    match fs::read_dir(outbox) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
            .count(),
        Err(_) => 0,
    }
}

fn fanout_send(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("fanout-send").unwrap();
    cmd.env("FANOUT_CONFIG", &env.config_path)
        .env_remove("FANOUT_DB_PATH")
        .env_remove("RUST_LOG");
    cmd
}

#[tokio::test]
async fn test_once_with_empty_queue() {
    let env = setup_test_env();

    fanout_send(&env)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Sweep complete: 0 published, 0 failed, 0 skipped",
        ))
        .stderr(predicate::str::contains("fanout-send daemon starting"));
}

#[tokio::test]
async fn test_once_publishes_due_posts() {
    let env = setup_test_env();
    let db = Database::new(&env.db_path).await.unwrap();

    let due = db
        .create_post(NewPost::new("due now").with_platforms(["archive"]))
        .await
        .unwrap();
    let future = db
        .create_post(
            NewPost::new("next year")
                .with_platforms(["archive"])
                .scheduled(Schedule::Date(
                    (chrono::Utc::now() + chrono::Duration::days(365)).date_naive(),
                )),
        )
        .await
        .unwrap();

    fanout_send(&env)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Sweep complete: 1 published, 0 failed, 1 skipped",
        ));

    assert!(db.get_post(&due).await.unwrap().unwrap().published);
    assert!(!db.get_post(&future).await.unwrap().unwrap().published);
    assert_eq!(outbox_documents(&env.outbox), 1);

    let document = fs::read_dir(&env.outbox)
        .unwrap()
        .filter_map(|e| e.ok())
        .next()
        .unwrap()
        .path();
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(document).unwrap()).unwrap();
    assert_eq!(json["payload"]["text"], "due now");
}

#[tokio::test]
async fn test_once_counts_unknown_platform_as_failed() {
    let env = setup_test_env();
    let db = Database::new(&env.db_path).await.unwrap();
    let id = db
        .create_post(NewPost::new("nowhere to go").with_platforms(["gopher"]))
        .await
        .unwrap();

    fanout_send(&env)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 published, 1 failed"));

    // Left for the next cycle
    let unpublished = db.list_posts(PostFilter::unpublished()).await.unwrap();
    assert_eq!(unpublished.len(), 1);
    assert_eq!(unpublished[0].id, id);
}

#[tokio::test]
async fn test_invalid_config_exits_with_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");
    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    Command::cargo_bin("fanout-send")
        .unwrap()
        .env("FANOUT_CONFIG", invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let env = setup_test_env();

    fanout_send(&env)
        .args(["--interval", "0"])
        .assert()
        .failure();
}

#[tokio::test]
async fn test_json_log_format() {
    let env = setup_test_env();

    fanout_send(&env)
        .args(["--once", "--log-format", "json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"INFO\""));
}

#[tokio::test]
async fn test_verbose_logging() {
    let env = setup_test_env();

    fanout_send(&env)
        .args(["--once", "--verbose"])
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG"));
}

#[tokio::test]
async fn test_help_mentions_signals() {
    Command::cargo_bin("fanout-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SIGTERM"))
        .stdout(predicate::str::contains("--interval"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_shuts_down_cleanly() {
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let env = setup_test_env();
    let db = Database::new(&env.db_path).await.unwrap();
    let id = db
        .create_post(NewPost::new("publish then stop").with_platforms(["archive"]))
        .await
        .unwrap();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("fanout-send"))
        .env("FANOUT_CONFIG", &env.config_path)
        .env_remove("FANOUT_DB_PATH")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Wait for the first cycle to publish the post
    let deadline = Instant::now() + Duration::from_secs(10);
    while !db.get_post(&id).await.unwrap().unwrap().published {
        assert!(Instant::now() < deadline, "daemon never published the post");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let status = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        assert!(Instant::now() < deadline, "daemon did not stop after SIGTERM");
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    assert!(exit.success());
    assert_eq!(outbox_documents(&env.outbox), 1);
}
