//! Backup system for Invoicer
//!
//! Produces point-in-time snapshots of the live SQLite database together with
//! the `images/` and `pdfs/` asset trees, catalogs them, restores them on
//! demand, and can take snapshots on a cron schedule while the application
//! keeps serving requests.
//!
//! # Architecture
//!
//! - `ArchiveCatalog`: lists published archives, newest first
//! - `SnapshotBuilder`: exports the database and packs one archive at a time
//! - `RestoreCoordinator`: validates, extracts and swaps in an archive
//! - `Scheduler`: triggers snapshots from a five-field cron expression
//! - `BackupManager`: the facade wiring the above to one data root
//!
//! # Archive Format
//!
//! `<product>-backup-<YYYY-MM-DD_HHMMSS>.tar.gz`, a gzip-compressed tar with
//! `database.db` and optional `images/...` and `pdfs/...` entries. Archives are
//! written under a temporary name and renamed into place when complete.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use invoicer::backup::{BackupManager, RestoreOutcome};
//! use invoicer::config::{InvoicerPaths, Settings};
//! use invoicer::db::Database;
//!
//! let paths = InvoicerPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let db = Arc::new(Database::open(paths.database_file())?);
//! let manager = BackupManager::new(paths, &settings, db);
//!
//! let archive = manager.create_backup()?;
//! match manager.restore_backup(&archive.filename)? {
//!     RestoreOutcome::Success(report) => println!("{}", report.summary()),
//!     RestoreOutcome::Partial { stage, .. } => eprintln!("stopped at {stage}"),
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod catalog;
pub mod cron;
mod manager;
pub mod restore;
pub mod scheduler;
pub mod snapshot;

pub use archive::{ArchiveContents, BackupArchive};
pub use cancel::CancelToken;
pub use catalog::ArchiveCatalog;
pub use cron::CronSchedule;
pub use manager::BackupManager;
pub use restore::{RestoreCoordinator, RestoreOutcome, RestoreReport, RestoreStage};
pub use scheduler::Scheduler;
pub use snapshot::SnapshotBuilder;
