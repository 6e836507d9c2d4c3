//! Backup manager for Invoicer
//!
//! Single entry point the rest of the application uses for backups. It wires
//! the catalog, snapshot builder, restore coordinator and scheduler to one
//! data root and one live connection, and completes the reopen handshake after
//! a successful restore.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use super::archive::{inspect_archive, ArchiveContents, BackupArchive};
use super::catalog::ArchiveCatalog;
use super::restore::{RestoreCoordinator, RestoreOutcome};
use super::scheduler::Scheduler;
use super::snapshot::SnapshotBuilder;
use crate::config::paths::InvoicerPaths;
use crate::config::settings::Settings;
use crate::db::ConnectionHandle;
use crate::error::InvoicerResult;

/// Manages backup creation, listing, deletion and restore
pub struct BackupManager {
    catalog: ArchiveCatalog,
    snapshots: Arc<SnapshotBuilder>,
    restorer: RestoreCoordinator,
    scheduler: Scheduler,
    db: Arc<dyn ConnectionHandle>,
}

impl BackupManager {
    /// Create a new BackupManager
    pub fn new(paths: InvoicerPaths, settings: &Settings, db: Arc<dyn ConnectionHandle>) -> Self {
        let paths = paths.with_backup_dir(settings.backup_dir.clone());
        let product = settings.product_name.clone();

        let catalog = ArchiveCatalog::new(paths.backup_dir(), product.clone());
        let snapshots = Arc::new(SnapshotBuilder::new(paths.clone(), product, db.clone()));
        let restorer = RestoreCoordinator::new(paths, catalog.clone(), db.clone());
        let scheduler = Scheduler::new(snapshots.clone());

        Self {
            catalog,
            snapshots,
            restorer,
            scheduler,
            db,
        }
    }

    /// Create a backup of the database and asset directories
    pub fn create_backup(&self) -> InvoicerResult<BackupArchive> {
        self.snapshots.create_snapshot()
    }

    /// List all available backups, newest first
    pub fn list_backups(&self) -> InvoicerResult<Vec<BackupArchive>> {
        self.catalog.list_archives()
    }

    /// Delete a backup by filename
    pub fn delete_backup(&self, filename: &str) -> InvoicerResult<()> {
        self.catalog.delete(filename)
    }

    /// Restore a backup by filename and reopen the live connection
    ///
    /// Snapshots, scheduled ones included, wait until the restore is done. A
    /// `Partial` outcome leaves the connection closed; the pre-restore copy
    /// named in the outcome is the recovery path.
    pub fn restore_backup(&self, filename: &str) -> InvoicerResult<RestoreOutcome> {
        let _paused = self.snapshots.pause();
        let outcome = self.restorer.restore(filename)?;

        match &outcome {
            RestoreOutcome::Success(report) => {
                if self.db.needs_reopen() {
                    self.db.reopen()?;
                }
                info!(archive = %report.archive.filename, "Database reopened after restore");
            }
            RestoreOutcome::Partial { stage, .. } => {
                error!(stage = %stage, "Restore incomplete; database left closed");
            }
        }

        Ok(outcome)
    }

    /// Get a specific backup by filename
    pub fn get_backup(&self, filename: &str) -> InvoicerResult<BackupArchive> {
        self.catalog.get(filename)
    }

    /// Get the most recent backup
    pub fn get_latest_backup(&self) -> InvoicerResult<Option<BackupArchive>> {
        self.catalog.latest()
    }

    /// Summarize what a backup contains without extracting it
    pub fn inspect_backup(&self, filename: &str) -> InvoicerResult<ArchiveContents> {
        let archive = self.catalog.get(filename)?;
        inspect_archive(&archive.path)
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &Path {
        self.catalog.backup_dir()
    }

    /// The process-wide scheduler; starting it again replaces the schedule
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
