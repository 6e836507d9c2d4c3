//! Recurring snapshots on a cron schedule
//!
//! The scheduler owns one background thread that sleeps until the next cron
//! fire time and then runs a snapshot. A failed run is logged and the next
//! fire time is computed as usual.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::cancel::CancelToken;
use super::cron::CronSchedule;
use super::snapshot::SnapshotBuilder;
use crate::error::{InvoicerError, InvoicerResult};

struct ActiveSchedule {
    schedule: CronSchedule,
    stop_tx: Sender<()>,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl ActiveSchedule {
    fn shutdown(self) {
        self.cancel.cancel();
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            warn!("Backup scheduler thread panicked");
        }
        info!(schedule = %self.schedule, "Backup schedule stopped");
    }
}

/// Triggers snapshots from a single cron expression
pub struct Scheduler {
    builder: Arc<SnapshotBuilder>,
    active: Mutex<Option<ActiveSchedule>>,
}

impl Scheduler {
    /// Create a stopped scheduler that will drive `builder`
    pub fn new(builder: Arc<SnapshotBuilder>) -> Self {
        Self {
            builder,
            active: Mutex::new(None),
        }
    }

    /// Start snapshotting on `expression`
    ///
    /// An empty expression disables scheduling. Starting again replaces the
    /// current schedule.
    pub fn start(&self, expression: &str) -> InvoicerResult<()> {
        let expression = expression.trim();
        if expression.is_empty() {
            info!("No backup schedule configured");
            return Ok(());
        }

        let schedule = CronSchedule::parse(expression)?;
        let first_run = schedule.next_after(&Local::now())?;

        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.shutdown();
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let cancel = CancelToken::new();
        let worker = Worker {
            schedule: schedule.clone(),
            builder: self.builder.clone(),
            stop_rx,
            cancel: cancel.clone(),
        };

        let handle = thread::Builder::new()
            .name("backup-scheduler".to_string())
            .spawn(move || worker.run())
            .map_err(|e| InvoicerError::Io(format!("Failed to spawn scheduler thread: {}", e)))?;

        info!(schedule = %schedule, next_run = %first_run, "Backup schedule started");

        *active = Some(ActiveSchedule {
            schedule,
            stop_tx,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Stop the schedule; safe to call when already stopped
    ///
    /// A scheduled snapshot that is mid-flight is cancelled and cleaned up.
    pub fn stop(&self) {
        let active = self.active.lock().take();
        if let Some(active) = active {
            active.shutdown();
        }
    }

    /// Whether a schedule is active
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// The active cron expression, if any
    pub fn schedule(&self) -> Option<CronSchedule> {
        self.active.lock().as_ref().map(|a| a.schedule.clone())
    }

    /// When the active schedule fires next
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.schedule()
            .and_then(|s| s.next_after(&Local::now()).ok())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    schedule: CronSchedule,
    builder: Arc<SnapshotBuilder>,
    stop_rx: Receiver<()>,
    cancel: CancelToken,
}

impl Worker {
    fn run(self) {
        loop {
            let now = Local::now();
            let next = match self.schedule.next_after(&now) {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "Backup schedule has no next run; stopping");
                    return;
                }
            };

            let wait = (next - now).to_std().unwrap_or_default();
            match self.stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }

            if self.fire().is_break() {
                return;
            }
        }
    }

    /// Take one scheduled snapshot; only cancellation ends the schedule
    fn fire(&self) -> ControlFlow<()> {
        match self.builder.create_snapshot_with(&self.cancel) {
            Ok(archive) => info!(archive = %archive.filename, "Scheduled backup complete"),
            Err(e) if e.is_cancelled() => return ControlFlow::Break(()),
            Err(e) => error!(error = %e, "Scheduled backup failed"),
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::InvoicerPaths;
    use crate::db::{ConnectionHandle, Database};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn create_test_scheduler() -> (Scheduler, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = InvoicerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        let db = Arc::new(Database::open(paths.database_file()).unwrap());
        let builder = Arc::new(SnapshotBuilder::new(paths, "invoicer", db));
        (Scheduler::new(builder), temp_dir)
    }

    fn create_test_worker() -> (Worker, Sender<()>, Arc<Database>, InvoicerPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = InvoicerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        let db = Arc::new(Database::open(paths.database_file()).unwrap());
        let builder = Arc::new(SnapshotBuilder::new(paths.clone(), "invoicer", db.clone()));

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let worker = Worker {
            schedule: CronSchedule::parse("* * * * *").unwrap(),
            builder,
            stop_rx,
            cancel: CancelToken::new(),
        };
        (worker, stop_tx, db, paths, temp_dir)
    }

    fn archive_count(paths: &InvoicerPaths) -> usize {
        std::fs::read_dir(paths.backup_dir())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tar.gz")
            })
            .count()
    }

    #[test]
    fn test_empty_expression_is_noop() {
        let (scheduler, _temp) = create_test_scheduler();
        scheduler.start("").unwrap();
        scheduler.start("   ").unwrap();
        assert!(!scheduler.is_running());
        assert!(scheduler.next_run().is_none());
    }

    #[test]
    fn test_invalid_expression_schedules_nothing() {
        let (scheduler, _temp) = create_test_scheduler();
        let err = scheduler.start("every tuesday").unwrap_err();
        assert!(err.is_invalid());
        assert!(!scheduler.is_running());

        let err = scheduler.start("0 0 30 2 *").unwrap_err();
        assert!(err.is_invalid());
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_start_and_stop() {
        let (scheduler, _temp) = create_test_scheduler();
        scheduler.start("0 3 * * *").unwrap();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.schedule().unwrap().expression(), "0 3 * * *");
        assert!(scheduler.next_run().unwrap() > Local::now());

        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!scheduler.is_running());

        // Idempotent
        scheduler.stop();
    }

    #[test]
    fn test_restart_replaces_schedule() {
        let (scheduler, _temp) = create_test_scheduler();
        scheduler.start("0 3 * * *").unwrap();
        scheduler.start("30 4 * * *").unwrap();
        assert_eq!(scheduler.schedule().unwrap().expression(), "30 4 * * *");
        scheduler.stop();
    }

    #[test]
    fn test_failed_run_does_not_end_schedule() {
        let (worker, _stop_tx, db, paths, _temp) = create_test_worker();

        db.close().unwrap();
        std::fs::remove_file(paths.database_file()).unwrap();
        for sidecar in paths.database_sidecars() {
            let _ = std::fs::remove_file(sidecar);
        }

        assert!(worker.fire().is_continue());
        assert_eq!(archive_count(&paths), 0);

        // Database comes back; the next trigger succeeds
        db.reopen().unwrap();
        assert!(worker.fire().is_continue());
        assert_eq!(archive_count(&paths), 1);
    }

    #[test]
    fn test_cancelled_run_ends_schedule() {
        let (worker, _stop_tx, _db, paths, _temp) = create_test_worker();
        worker.cancel.cancel();

        assert!(worker.fire().is_break());
        assert_eq!(archive_count(&paths), 0);
    }

    #[test]
    fn test_worker_exits_when_stop_sender_drops() {
        let (worker, stop_tx, _db, _paths, _temp) = create_test_worker();
        let handle = thread::spawn(move || worker.run());

        drop(stop_tx);
        handle.join().unwrap();
    }
}
