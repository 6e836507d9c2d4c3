//! Backup restoration for Invoicer
//!
//! Restores the live database and asset trees from a catalogued archive.
//! The archive is unpacked into a staging directory inside the data root and
//! validated before anything live is touched. Once the database connection
//! has been released the restore is no longer all-or-nothing: a failure while
//! swapping files is reported as [`RestoreOutcome::Partial`] and the
//! pre-restore safety copy is the way back.

use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::archive::{BackupArchive, DATABASE_ENTRY};
use super::cancel::CancelToken;
use super::catalog::ArchiveCatalog;
use crate::config::paths::{InvoicerPaths, ASSET_DIRS};
use crate::db::ConnectionHandle;
use crate::error::{InvoicerError, InvoicerResult};

/// Step at which a restore stopped after live files started changing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStage {
    /// Replacing the live database file
    DatabaseSwap,
    /// Replacing one of the asset directories
    Assets(&'static str),
    /// Handing the connection back for reopen
    Handshake,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseSwap => write!(f, "database swap"),
            Self::Assets(name) => write!(f, "{} replacement", name),
            Self::Handshake => write!(f, "connection handshake"),
        }
    }
}

/// Details of a completed restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Archive the data came from
    pub archive: BackupArchive,
    /// Copy of the previous live database, if one was taken
    pub safety_copy: Option<PathBuf>,
    /// Asset directories that were replaced
    pub restored_assets: Vec<&'static str>,
}

impl RestoreReport {
    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let mut parts = vec!["database"];
        parts.extend(self.restored_assets.iter().copied());
        format!("Restored: {}", parts.join(", "))
    }
}

/// Result of a restore that got past validation
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    /// Every artifact in the archive is now live
    Success(RestoreReport),
    /// Live state was partially replaced before a failure
    Partial {
        /// Where the restore stopped
        stage: RestoreStage,
        /// What went wrong
        reason: String,
        /// Copy of the previous live database, if one was taken
        safety_copy: Option<PathBuf>,
    },
}

impl RestoreOutcome {
    /// Whether the restore fully completed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Validates, extracts and swaps in archived data
pub struct RestoreCoordinator {
    paths: InvoicerPaths,
    catalog: ArchiveCatalog,
    db: Arc<dyn ConnectionHandle>,
}

impl RestoreCoordinator {
    /// Create a new RestoreCoordinator
    pub fn new(paths: InvoicerPaths, catalog: ArchiveCatalog, db: Arc<dyn ConnectionHandle>) -> Self {
        Self { paths, catalog, db }
    }

    /// Restore the archive named `archive_name` from the catalog
    ///
    /// On success the connection is left in `PendingReopen`; reopening it is
    /// the caller's job.
    pub fn restore(&self, archive_name: &str) -> InvoicerResult<RestoreOutcome> {
        self.restore_with(archive_name, &CancelToken::new())
    }

    /// Restore, honoring `cancel` until the live connection is released
    pub fn restore_with(
        &self,
        archive_name: &str,
        cancel: &CancelToken,
    ) -> InvoicerResult<RestoreOutcome> {
        let archive = self.catalog.get(archive_name)?;
        info!(archive = %archive.filename, "Starting restore");

        fs::create_dir_all(self.paths.base_dir())
            .map_err(|e| InvoicerError::Io(format!("Failed to create data directory: {}", e)))?;
        let staging = tempfile::Builder::new()
            .prefix(".restore-")
            .tempdir_in(self.paths.base_dir())
            .map_err(|e| InvoicerError::Io(format!("Failed to create staging directory: {}", e)))?;

        extract_archive(&archive.path, staging.path(), cancel)?;

        let extracted_db = staging.path().join(DATABASE_ENTRY);
        if !extracted_db.is_file() {
            return Err(InvoicerError::Invalid(format!(
                "{} has no {} entry",
                archive.filename, DATABASE_ENTRY
            )));
        }
        cancel.check("restore")?;

        // Still awaiting reopen from an earlier restore: already released
        let already_released = self.db.needs_reopen();
        self.db.close()?;

        // Nothing below may be cancelled: live files start changing here.
        let safety_copy = self.take_safety_copy();

        if let Err(e) = self.swap_database(&extracted_db) {
            return Ok(partial(RestoreStage::DatabaseSwap, e, safety_copy));
        }

        let mut restored_assets = Vec::new();
        for name in ASSET_DIRS {
            let extracted = staging.path().join(name);
            if !extracted.is_dir() {
                debug!(directory = name, "Archive has no asset directory, keeping live copy");
                continue;
            }
            if let Err(e) = replace_dir(&extracted, &self.paths.asset_dir(name)) {
                return Ok(partial(RestoreStage::Assets(name), e, safety_copy));
            }
            restored_assets.push(name);
        }

        if !already_released {
            if let Err(e) = self.db.mark_pending_reopen() {
                return Ok(partial(RestoreStage::Handshake, e, safety_copy));
            }
        }

        info!(
            archive = %archive.filename,
            assets = ?restored_assets,
            "Restore complete, connection awaiting reopen"
        );

        Ok(RestoreOutcome::Success(RestoreReport {
            archive,
            safety_copy,
            restored_assets,
        }))
    }

    /// Best-effort copy of the current database before it is replaced
    fn take_safety_copy(&self) -> Option<PathBuf> {
        let live = self.paths.database_file();
        if !live.exists() {
            return None;
        }

        let target = self.paths.pre_restore_file();
        match fs::copy(&live, &target) {
            Ok(_) => {
                info!(path = %target.display(), "Saved pre-restore copy");
                Some(target)
            }
            Err(e) => {
                warn!(error = %e, "Could not save pre-restore copy; continuing restore");
                None
            }
        }
    }

    /// Replace the live database file and drop stale SQLite sidecars
    fn swap_database(&self, extracted_db: &Path) -> InvoicerResult<()> {
        for sidecar in self.paths.database_sidecars() {
            if sidecar.exists() {
                fs::remove_file(&sidecar).map_err(|e| {
                    InvoicerError::Io(format!("Failed to remove {}: {}", sidecar.display(), e))
                })?;
            }
        }
        replace_file(extracted_db, &self.paths.database_file())
    }
}

fn partial(stage: RestoreStage, err: InvoicerError, safety_copy: Option<PathBuf>) -> RestoreOutcome {
    error!(
        stage = %stage,
        error = %err,
        safety_copy = ?safety_copy,
        "Restore stopped part way; live data is inconsistent"
    );
    RestoreOutcome::Partial {
        stage,
        reason: err.to_string(),
        safety_copy,
    }
}

/// Unpack every entry into `dest`, refusing paths that escape it
fn extract_archive(archive: &Path, dest: &Path, cancel: &CancelToken) -> InvoicerResult<()> {
    let file = File::open(archive)
        .map_err(|e| InvoicerError::Io(format!("Failed to open {}: {}", archive.display(), e)))?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = tar
        .entries()
        .map_err(|e| InvoicerError::Io(format!("Failed to read archive: {}", e)))?;

    for entry in entries {
        cancel.check("restore")?;
        let mut entry =
            entry.map_err(|e| InvoicerError::Io(format!("Failed to read archive entry: {}", e)))?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| InvoicerError::Io(format!("Failed to extract archive: {}", e)))?;
        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            return Err(InvoicerError::Invalid(format!(
                "archive entry '{}' escapes the extraction directory",
                path
            )));
        }
    }

    Ok(())
}

/// Move `src` over `dst`, copying when a rename is not possible
fn replace_file(src: &Path, dst: &Path) -> InvoicerResult<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    debug!(src = %src.display(), dst = %dst.display(), "Rename failed, copying instead");
    fs::copy(src, dst)
        .map_err(|e| InvoicerError::Io(format!("Failed to copy {}: {}", dst.display(), e)))?;
    File::open(dst)
        .and_then(|f| f.sync_all())
        .map_err(|e| InvoicerError::Io(format!("Failed to sync {}: {}", dst.display(), e)))?;
    Ok(())
}

/// Replace the directory at `dst` wholesale with the tree at `src`
fn replace_dir(src: &Path, dst: &Path) -> InvoicerResult<()> {
    if dst.exists() {
        fs::remove_dir_all(dst)
            .map_err(|e| InvoicerError::Io(format!("Failed to remove {}: {}", dst.display(), e)))?;
    }

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    debug!(src = %src.display(), dst = %dst.display(), "Rename failed, copying tree instead");
    for entry in WalkDir::new(src) {
        let entry =
            entry.map_err(|e| InvoicerError::Io(format!("Failed to walk {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| InvoicerError::Io(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
