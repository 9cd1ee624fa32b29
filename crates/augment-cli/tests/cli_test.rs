//! End-to-end tests driving the `augment` binary.

use std::path::Path;
use std::process::{Command, Output};

use augment_config::testing::TestEnvironment;

/// Run augment inside the test environment's project directory
fn augment(env: &TestEnvironment, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_augment"))
        .args(args)
        .current_dir(&env.project_root)
        .envs(env.cli_env())
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .output()
        .expect("Failed to execute augment")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn log_json(env: &TestEnvironment, file: &str) -> Vec<serde_json::Value> {
    let out = augment(env, &["log", file, "--json"]);
    assert!(out.status.success(), "log failed: {}", stderr(&out));
    serde_json::from_slice(&out.stdout).unwrap()
}

#[test]
fn test_init_creates_space() {
    let env = TestEnvironment::new().unwrap();
    let out = augment(&env, &["init"]);
    assert!(out.status.success(), "{}", stderr(&out));

    for name in ["versions", "file_versions", "file_metadata", "snapshots"] {
        assert!(env.project_root.join(".augment").join(name).is_dir());
    }
    // Idempotent
    assert!(augment(&env, &["init"]).status.success());
}

#[test]
fn test_where_finds_nearest_space() {
    let env = TestEnvironment::new().unwrap();
    env.create_dir("sub/deeper").unwrap();
    assert!(augment(&env, &["init"]).status.success());

    let out = augment(&env, &["where", "sub/deeper/file.txt"]);
    assert!(out.status.success());
    assert_eq!(
        Path::new(stdout(&out).trim()),
        env.project_root.as_path()
    );
}

#[test]
fn test_where_without_space_exits_nonzero() {
    let env = TestEnvironment::new().unwrap();
    let out = augment(&env, &["where", "a.txt"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!env.project_root.join(".augment").exists());
}

#[test]
fn test_save_then_log_newest_first() {
    let env = TestEnvironment::new().unwrap();
    assert!(augment(&env, &["init"]).status.success());

    env.create_file("a.txt", b"v1").unwrap();
    assert!(augment(&env, &["save", "a.txt"]).status.success());
    env.create_file("a.txt", b"v2").unwrap();
    assert!(augment(&env, &["save", "a.txt", "-m", "second"]).status.success());

    let records = log_json(&env, "a.txt");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["comment"], "second");
    assert_eq!(records[0]["size"], 2);
    assert!(records[1].get("comment").is_none());
    let expected_path = env.project_root.join("a.txt");
    assert_eq!(records[0]["filePath"], expected_path.to_str().unwrap());
}

#[test]
fn test_log_never_versioned_file_is_empty() {
    let env = TestEnvironment::new().unwrap();
    assert!(augment(&env, &["init"]).status.success());
    assert!(log_json(&env, "missing.txt").is_empty());
}

#[test]
fn test_cat_prints_version_content() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("a.txt", b"first content").unwrap();
    assert!(augment(&env, &["save", "a.txt"]).status.success());
    env.create_file("a.txt", b"changed").unwrap();

    let records = log_json(&env, "a.txt");
    let id = records[0]["id"].as_str().unwrap().to_string();

    let out = augment(&env, &["cat", "a.txt", &id]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(out.stdout, b"first content");

    // Unique prefix works too
    let out = augment(&env, &["cat", "a.txt", &id[..20]]);
    assert_eq!(out.stdout, b"first content");
}

#[test]
fn test_restore_keeps_backup() {
    let env = TestEnvironment::new().unwrap();
    let file = env.create_file("a.txt", b"original").unwrap();
    assert!(augment(&env, &["save", "a.txt"]).status.success());
    let id = log_json(&env, "a.txt")[0]["id"].as_str().unwrap().to_string();

    std::fs::write(&file, b"edited").unwrap();
    let out = augment(&env, &["restore", "a.txt", &id]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(std::fs::read(&file).unwrap(), b"original");

    let records = log_json(&env, "a.txt");
    assert_eq!(records.len(), 2);
    assert!(records[0]["comment"]
        .as_str()
        .unwrap()
        .starts_with("Pre-restore backup"));
}

#[test]
fn test_log_verify_reports_damage() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("a.txt", b"v1").unwrap();
    assert!(augment(&env, &["save", "a.txt"]).status.success());

    let records = log_json(&env, "a.txt");
    let blob = records[0]["storagePath"].as_str().unwrap();
    std::fs::remove_file(blob).unwrap();

    // Plain listing still shows it
    assert_eq!(log_json(&env, "a.txt").len(), 1);

    let out = augment(&env, &["log", "a.txt", "--verify"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("missing blob"));
}

#[test]
fn test_doctor_healthy_and_damaged() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("a.txt", b"v1").unwrap();
    assert!(augment(&env, &["save", "a.txt"]).status.success());

    let out = augment(&env, &["doctor", "a.txt"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stderr(&out).contains("1 version(s) recorded"));

    let blob = log_json(&env, "a.txt")[0]["storagePath"]
        .as_str()
        .unwrap()
        .to_string();
    std::fs::write(blob, b"tampered").unwrap();

    let out = augment(&env, &["doctor", "a.txt"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("does not match its hash"));
}

#[test]
fn test_id_prints_identifier() {
    let env = TestEnvironment::new().unwrap();
    let out = augment(&env, &["id", "a.txt"]);
    assert!(out.status.success());

    let expected_path = env.project_root.join("a.txt");
    let expected = augment_store::identifier(expected_path.to_str().unwrap());
    assert_eq!(stdout(&out).lines().next(), Some(expected.as_str()));
}

#[test]
fn test_config_show_returns_valid_toml() {
    let env = TestEnvironment::new().unwrap();
    let out = augment(&env, &["config", "show"]);
    assert!(out.status.success());

    let parsed: augment_config::Config = toml_from(&stdout(&out));
    assert!(parsed.store.lazy_init);
}

#[test]
fn test_config_project_file_applies() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[store]\nlazy_init = false\n").unwrap();

    let out = augment(&env, &["config", "show"]);
    let parsed: augment_config::Config = toml_from(&stdout(&out));
    assert!(!parsed.store.lazy_init);
}

#[test]
fn test_config_init_refuses_overwrite() {
    let env = TestEnvironment::new().unwrap();
    assert!(augment(&env, &["config", "init"]).status.success());
    assert!(env.project_root.join(".augment/config.toml").is_file());

    assert!(!augment(&env, &["config", "init"]).status.success());
    assert!(augment(&env, &["config", "init", "--force"]).status.success());
}

fn toml_from(s: &str) -> augment_config::Config {
    toml::from_str(s).unwrap()
}
