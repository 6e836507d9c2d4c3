//! Integration tests for the invoicer CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn invoicer(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("invoicer").unwrap();
    cmd.env("INVOICER_DATA_DIR", data_dir)
        .env("RUST_LOG", "warn")
        .env_remove("INVOICER_BACKUP_SCHEDULE");
    cmd
}

fn create_test_data_dir() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    invoicer(temp_dir.path()).arg("init").assert().success();
    temp_dir
}

fn backup_files(data_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(data_dir.join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_cli_help() {
    let temp_dir = TempDir::new().unwrap();
    invoicer(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("schedule"));
}

#[test]
fn test_init_creates_layout() {
    let temp_dir = create_test_data_dir();
    let root = temp_dir.path();

    assert!(root.join("invoicer.db").exists());
    assert!(root.join("images").is_dir());
    assert!(root.join("pdfs").is_dir());
    assert!(root.join("backups").is_dir());
    assert!(root.join("config.json").exists());
}

#[test]
fn test_config_shows_paths() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup directory"))
        .stdout(predicate::str::contains("(disabled)"));
}

#[test]
fn test_backup_requires_init() {
    let temp_dir = TempDir::new().unwrap();
    invoicer(temp_dir.path())
        .args(["backup", "create"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invoicer init"));
}

#[test]
fn test_backup_create_and_list() {
    let temp_dir = create_test_data_dir();
    fs::write(temp_dir.path().join("images").join("logo.png"), b"png").unwrap();

    invoicer(temp_dir.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));

    invoicer(temp_dir.path())
        .args(["backup", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: invoicer-backup-"));

    let files = backup_files(temp_dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with(".tar.gz"));

    invoicer(temp_dir.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(files[0].as_str()))
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    invoicer(temp_dir.path())
        .args(["backup", "info", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Images:   1 file(s)"))
        .stdout(predicate::str::contains("Status: Restorable"));
}

#[test]
fn test_restore_requires_force() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .args(["backup", "create"])
        .assert()
        .success();

    invoicer(temp_dir.path())
        .args(["backup", "restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    assert!(!temp_dir.path().join("invoicer.db.pre-restore").exists());
}

#[test]
fn test_restore_latest() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .args(["backup", "create"])
        .assert()
        .success();

    invoicer(temp_dir.path())
        .args(["backup", "restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"));
    assert!(temp_dir.path().join("invoicer.db.pre-restore").exists());
}

#[test]
fn test_restore_missing_backup_fails() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .args(["backup", "restore", "invoicer-backup-2020-01-01_000000.tar.gz", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup not found"));
}

#[test]
fn test_delete_backup() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .args(["backup", "create"])
        .assert()
        .success();
    let name = backup_files(temp_dir.path()).remove(0);

    invoicer(temp_dir.path())
        .args(["backup", "delete", name.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    assert_eq!(backup_files(temp_dir.path()).len(), 1);

    invoicer(temp_dir.path())
        .args(["backup", "delete", name.as_str(), "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted backup"));
    assert!(backup_files(temp_dir.path()).is_empty());
}

#[test]
fn test_schedule_rejects_bad_cron() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .args(["schedule", "--cron", "61 * * * *"])
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid"));
}

#[test]
fn test_schedule_without_expression() {
    let temp_dir = create_test_data_dir();
    invoicer(temp_dir.path())
        .arg("schedule")
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backup schedule configured"));
}
