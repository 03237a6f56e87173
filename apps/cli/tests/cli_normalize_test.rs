//! Integration tests for the offline `lorakit normalize` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A `lorakit` command isolated from the user's config files.
fn lorakit(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lorakit").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env_remove("LORAKIT_BACKEND_URL")
        .env_remove("LORAKIT_LOG_LEVEL");
    cmd
}

fn stdout_rows(output: &std::process::Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each stdout line should be a JSON example"))
        .collect()
}

#[test]
fn test_normalize_prints_canonical_jsonl_in_file_order() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("qa.csv"), "question,answer,tags\nWhat is LoRA?,A low-rank adapter.,intro|lora\n").unwrap();
    fs::write(
        temp_dir.path().join("chat.jsonl"),
        r#"{"messages":[{"role":"system","content":"Be brief."},{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello!"}]}"#,
    )
    .unwrap();

    let assert = lorakit(&temp_dir).args(["normalize", "qa.csv", "chat.jsonl"]).assert().success();
    let rows = stdout_rows(assert.get_output());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["instruction"], "What is LoRA?");
    assert_eq!(rows[0]["output"], "A low-rank adapter.");
    assert_eq!(rows[0]["tags"], serde_json::json!(["intro", "lora"]));
    assert_eq!(rows[1]["instruction"], "Hi");
    assert_eq!(rows[1]["input"], "Be brief.");
    assert_eq!(rows[1]["output"], "Hello!");
}

#[test]
fn test_normalize_warns_about_unreadable_file_and_keeps_others() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("good.jsonl"), "{\"instruction\":\"q\",\"output\":\"a\"}\n").unwrap();
    fs::write(temp_dir.path().join("blob.bin"), [0x89_u8, 0x50, 0x00, 0xff, 0xfe]).unwrap();

    let assert = lorakit(&temp_dir)
        .args(["normalize", "good.jsonl", "blob.bin"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning:"))
        .stderr(predicate::str::contains("blob.bin"));

    assert_eq!(stdout_rows(assert.get_output()).len(), 1);
}

#[test]
fn test_normalize_document_becomes_summary_prompts() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("notes.md"), "First paragraph.\n\nSecond paragraph.\n").unwrap();

    let assert = lorakit(&temp_dir)
        .args(["normalize", "--document", "notes.md"])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 examples"));

    let rows = stdout_rows(assert.get_output());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["instruction"], "Summarize the following text.");
    assert_eq!(rows[1]["input"], "Second paragraph.");
}

#[test]
fn test_normalize_keeps_same_named_files_from_different_directories() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("a")).unwrap();
    fs::create_dir(temp_dir.path().join("b")).unwrap();
    fs::write(temp_dir.path().join("a/data.csv"), "question,answer\nFrom a?,Yes.\n").unwrap();
    fs::write(temp_dir.path().join("b/data.csv"), "question,answer\nFrom b?,Also yes.\n").unwrap();

    let assert = lorakit(&temp_dir)
        .args(["normalize", "a/data.csv", "b/data.csv"])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 examples"));
    let rows = stdout_rows(assert.get_output());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["instruction"], "From a?");
    assert_eq!(rows[1]["instruction"], "From b?");
}

#[test]
fn test_normalize_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    lorakit(&temp_dir)
        .args(["normalize", "does-not-exist.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.csv"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("broken.toml"), "backend_url = [").unwrap();

    lorakit(&temp_dir)
        .args(["--config", "broken.toml", "normalize"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_help_lists_subcommands() {
    let temp_dir = TempDir::new().unwrap();

    lorakit(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("console"))
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("--backend-url"));
}
