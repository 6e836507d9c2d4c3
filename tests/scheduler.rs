//! Timing test for the backup scheduler
//!
//! Waits on the wall clock, so it is ignored by default:
//! `cargo test --test scheduler -- --ignored`

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use invoicer::backup::BackupManager;
use invoicer::config::{InvoicerPaths, Settings};
use invoicer::db::Database;
use tempfile::TempDir;

fn archive_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().ends_with(".tar.gz"))
                .count()
        })
        .unwrap_or(0)
}

#[test]
#[ignore]
fn test_every_minute_fires_then_stops() {
    let temp_dir = TempDir::new().unwrap();
    let paths = InvoicerPaths::with_base_dir(temp_dir.path().to_path_buf());
    paths.ensure_directories().unwrap();
    let db = Arc::new(Database::open(paths.database_file()).unwrap());
    db.with_connection(|conn| conn.execute_batch("CREATE TABLE invoices (number TEXT);"))
        .unwrap();

    let manager = BackupManager::new(paths, &Settings::default(), db);
    let scheduler = manager.scheduler();
    scheduler.start("* * * * *").unwrap();

    let started = Instant::now();
    while archive_count(manager.backup_dir()) == 0 && started.elapsed() < Duration::from_secs(61) {
        thread::sleep(Duration::from_millis(250));
    }
    assert!(archive_count(manager.backup_dir()) >= 1);

    scheduler.stop();
    let after_stop = archive_count(manager.backup_dir());
    thread::sleep(Duration::from_secs(61));
    assert_eq!(archive_count(manager.backup_dir()), after_stop);
}
