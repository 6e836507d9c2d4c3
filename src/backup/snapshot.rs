//! Snapshot creation
//!
//! Produces one consistent archive from the live data root while the
//! application keeps using the database. The live file is exported through
//! SQLite's online backup API into a private staging directory, packed
//! together with the asset trees, and published with a single rename.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, DatabaseName, OpenFlags};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::archive::{archive_filename, validate_archive_name, BackupArchive, DATABASE_ENTRY};
use super::cancel::CancelToken;
use crate::config::paths::{InvoicerPaths, ASSET_DIRS};
use crate::db::ConnectionHandle;
use crate::error::{InvoicerError, InvoicerResult};

/// Attempts at deriving an unused second-resolution filename
const NAME_ATTEMPTS: usize = 3;

/// Builds snapshot archives, one at a time per process
pub struct SnapshotBuilder {
    paths: InvoicerPaths,
    product: String,
    db: Arc<dyn ConnectionHandle>,
    in_flight: Mutex<()>,
}

impl SnapshotBuilder {
    /// Create a builder for the data root described by `paths`
    pub fn new(
        paths: InvoicerPaths,
        product: impl Into<String>,
        db: Arc<dyn ConnectionHandle>,
    ) -> Self {
        Self {
            paths,
            product: product.into(),
            db,
            in_flight: Mutex::new(()),
        }
    }

    /// Hold off snapshots until the returned guard is dropped
    ///
    /// Waits for a snapshot already in progress. Restores hold this while they
    /// swap live files so no archive captures a half-replaced tree.
    pub fn pause(&self) -> MutexGuard<'_, ()> {
        self.in_flight.lock()
    }

    /// Create a snapshot of the database and asset directories
    pub fn create_snapshot(&self) -> InvoicerResult<BackupArchive> {
        self.create_snapshot_with(&CancelToken::new())
    }

    /// Create a snapshot, aborting between entries if `cancel` fires
    ///
    /// Concurrent callers queue behind one another.
    pub fn create_snapshot_with(&self, cancel: &CancelToken) -> InvoicerResult<BackupArchive> {
        let _single_flight = self.in_flight.lock();
        cancel.check("snapshot")?;

        let backup_dir = self.paths.backup_dir();
        fs::create_dir_all(&backup_dir).map_err(|e| {
            InvoicerError::Io(format!("Failed to create backup directory: {}", e))
        })?;

        if let Err(e) = self.db.checkpoint() {
            warn!(error = %e, "WAL checkpoint failed; snapshot continues");
        }

        let live_db = self.paths.database_file();
        if !live_db.is_file() {
            return Err(InvoicerError::database_not_found(
                live_db.display().to_string(),
            ));
        }

        let staging = tempfile::Builder::new()
            .prefix("invoicer-snapshot-")
            .tempdir()
            .map_err(|e| InvoicerError::Io(format!("Failed to create staging directory: {}", e)))?;
        let db_copy = staging.path().join(DATABASE_ENTRY);
        export_database(&live_db, &db_copy)?;
        cancel.check("snapshot")?;

        let (filename, created_at) = self.unused_filename(&backup_dir)?;
        let final_path = backup_dir.join(&filename);

        let mut partial = tempfile::Builder::new()
            .prefix(".")
            .suffix(".partial")
            .tempfile_in(&backup_dir)
            .map_err(|e| InvoicerError::Io(format!("Failed to create archive: {}", e)))?;

        self.write_archive(partial.as_file_mut(), &db_copy, cancel)?;

        let file = partial.persist_noclobber(&final_path).map_err(|e| {
            InvoicerError::Io(format!("Failed to publish {}: {}", filename, e.error))
        })?;
        let size_bytes = file.metadata().map(|m| m.len()).unwrap_or_default();

        info!(archive = %filename, size_bytes, "Created backup");

        Ok(BackupArchive::from_path(&self.product, &final_path).unwrap_or(BackupArchive {
            filename,
            path: final_path,
            size_bytes,
            created_at,
            modified_at: None,
        }))
    }

    /// Pick a filename for "now" that is not already taken
    ///
    /// Archive names have second resolution; a second request inside the same
    /// second waits for the clock to tick over instead of overwriting.
    fn unused_filename(
        &self,
        backup_dir: &Path,
    ) -> InvoicerResult<(String, chrono::DateTime<Utc>)> {
        for _ in 0..NAME_ATTEMPTS {
            let now = Utc::now().trunc_subsecs(0);
            let filename = archive_filename(&self.product, now);
            validate_archive_name(&filename)?;
            if !backup_dir.join(&filename).exists() {
                return Ok((filename, now));
            }

            let elapsed_ms = u64::from(Utc::now().timestamp_subsec_millis());
            let wait = 1000_u64.saturating_sub(elapsed_ms) + 10;
            debug!(%filename, wait_ms = wait, "Archive name taken, waiting for next second");
            std::thread::sleep(Duration::from_millis(wait));
        }

        Err(InvoicerError::Io(
            "Could not derive an unused archive filename".to_string(),
        ))
    }

    /// Write all entries in fixed order: database, images, pdfs
    fn write_archive(
        &self,
        file: &mut File,
        db_copy: &Path,
        cancel: &CancelToken,
    ) -> InvoicerResult<()> {
        let encoder = GzEncoder::new(BufWriter::new(&mut *file), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        builder
            .append_path_with_name(db_copy, DATABASE_ENTRY)
            .map_err(|e| InvoicerError::Io(format!("Failed to add database to archive: {}", e)))?;

        for name in ASSET_DIRS {
            cancel.check("snapshot")?;
            let dir = self.paths.asset_dir(name);
            if dir.is_dir() {
                append_tree(&mut builder, &dir, name, cancel)?;
            } else {
                debug!(directory = name, "Asset directory absent, skipping");
            }
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| InvoicerError::Io(format!("Failed to finish archive: {}", e)))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| InvoicerError::Io(format!("Failed to compress archive: {}", e)))?;
        writer
            .flush()
            .map_err(|e| InvoicerError::Io(format!("Failed to flush archive: {}", e)))?;
        drop(writer);

        file.sync_all()
            .map_err(|e| InvoicerError::Io(format!("Failed to sync archive: {}", e)))?;

        Ok(())
    }
}

/// Copy the live database into `dest` with SQLite's online backup API
fn export_database(live_db: &Path, dest: &Path) -> InvoicerResult<()> {
    let src = Connection::open_with_flags(
        live_db,
        // Read-write without CREATE: a missing file fails instead of being
        // created, and WAL sidecars can be opened if needed.
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| InvoicerError::Io(format!("Failed to open live database: {}", e)))?;

    src.backup(DatabaseName::Main, dest, None)
        .map_err(|e| InvoicerError::Io(format!("Failed to export database: {}", e)))?;

    debug!(dest = %dest.display(), "Exported database snapshot");
    Ok(())
}

/// Append a directory tree under `prefix`, checking for cancellation per entry
fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    prefix: &str,
    cancel: &CancelToken,
) -> InvoicerResult<()> {
    let mut files = 0_usize;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        cancel.check("snapshot")?;
        let entry = entry.map_err(|e| {
            InvoicerError::Io(format!("Failed to walk {}: {}", dir.display(), e))
        })?;

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| InvoicerError::Io(e.to_string()))?;
        let name = Path::new(prefix).join(relative);

        let file_type = entry.file_type();
        let appended = if file_type.is_dir() {
            builder.append_dir(&name, entry.path())
        } else if file_type.is_file() {
            files += 1;
            builder.append_path_with_name(entry.path(), &name)
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        };
        appended
            .map_err(|e| InvoicerError::Io(format!("Failed to add {}: {}", name.display(), e)))?;
    }

    debug!(directory = prefix, files, "Archived asset directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::inspect_archive;
    use crate::db::Database;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_test_builder() -> (SnapshotBuilder, Arc<Database>, InvoicerPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = InvoicerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();

        let db = Arc::new(Database::open(paths.database_file()).unwrap());
        db.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE invoices (id INTEGER PRIMARY KEY, total INTEGER);
                 INSERT INTO invoices (total) VALUES (1200), (3400);",
            )
        })
        .unwrap();

        let builder = SnapshotBuilder::new(paths.clone(), "invoicer", db.clone());
        (builder, db, paths, temp_dir)
    }

    fn read_entry(archive: &Path, wanted: &str) -> Option<Vec<u8>> {
        let file = File::open(archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap() == Path::new(wanted) {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).unwrap();
                return Some(buf);
            }
        }
        None
    }

    #[test]
    fn test_snapshot_contains_database() {
        let (builder, _db, paths, _temp) = create_test_builder();

        let archive = builder.create_snapshot().unwrap();
        assert!(archive.path.exists());
        assert!(archive.filename.starts_with("invoicer-backup-"));
        assert!(archive.path.starts_with(fs::canonicalize(paths.backup_dir()).unwrap()));

        let db_bytes = read_entry(&archive.path, DATABASE_ENTRY).unwrap();
        assert!(!db_bytes.is_empty());
    }

    #[test]
    fn test_snapshot_data_is_queryable() {
        let (builder, _db, _paths, temp) = create_test_builder();
        let archive = builder.create_snapshot().unwrap();

        let out = temp.path().join("check.db");
        fs::write(&out, read_entry(&archive.path, DATABASE_ENTRY).unwrap()).unwrap();
        let conn = Connection::open(&out).unwrap();
        let total: i64 = conn
            .query_row("SELECT SUM(total) FROM invoices", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 4600);
    }

    #[test]
    fn test_snapshot_includes_present_assets_only() {
        let (builder, _db, paths, _temp) = create_test_builder();
        fs::create_dir_all(paths.images_dir().join("logos")).unwrap();
        fs::write(paths.images_dir().join("logos").join("acme.png"), b"png").unwrap();

        let archive = builder.create_snapshot().unwrap();
        let contents = inspect_archive(&archive.path).unwrap();
        assert!(contents.has_database);
        assert_eq!(contents.image_files, 1);
        assert_eq!(contents.pdf_files, 0);
        assert_eq!(
            read_entry(&archive.path, "images/logos/acme.png").unwrap(),
            b"png"
        );
    }

    #[test]
    fn test_snapshot_survives_closed_connection() {
        let (builder, db, _paths, _temp) = create_test_builder();
        db.close().unwrap();

        // Checkpoint fails on a closed connection, which is only a warning
        let archive = builder.create_snapshot().unwrap();
        assert!(inspect_archive(&archive.path).unwrap().is_restorable());
    }

    #[test]
    fn test_missing_database_publishes_nothing() {
        let (builder, db, paths, _temp) = create_test_builder();
        db.close().unwrap();
        fs::remove_file(paths.database_file()).unwrap();
        for sidecar in paths.database_sidecars() {
            let _ = fs::remove_file(sidecar);
        }

        let err = builder.create_snapshot().unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fs::read_dir(paths.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_snapshot_leaves_no_files() {
        let (builder, _db, paths, _temp) = create_test_builder();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = builder.create_snapshot_with(&cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fs::read_dir(paths.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_failure_mid_archive_removes_partial_file() {
        let (builder, _db, paths, _temp) = create_test_builder();
        fs::create_dir_all(paths.images_dir()).unwrap();
        fs::write(paths.images_dir().join("logo.png"), b"png").unwrap();

        // Passes the start and post-export checks, trips once the database
        // entry is already in the temporary archive
        let cancel = CancelToken::tripping_after(2);
        let err = builder.create_snapshot_with(&cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fs::read_dir(paths.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_product_name_with_separator_is_rejected() {
        let (_builder, db, paths, temp) = create_test_builder();
        let builder = SnapshotBuilder::new(paths.clone(), "../escape", db);

        let err = builder.create_snapshot().unwrap_err();
        assert!(err.is_invalid());
        assert_eq!(fs::read_dir(paths.backup_dir()).unwrap().count(), 0);
        let escaped = fs::read_dir(temp.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("escape-backup-")
            })
            .count();
        assert_eq!(escaped, 0);
    }

    #[test]
    fn test_archive_name_carries_utc_time() {
        let (builder, _db, _paths, _temp) = create_test_builder();
        let before = Utc::now().trunc_subsecs(0);
        let archive = builder.create_snapshot().unwrap();
        let after = Utc::now();

        assert!(archive.created_at >= before && archive.created_at <= after);
        assert_eq!(archive.filename, archive_filename("invoicer", archive.created_at));
    }

    #[test]
    fn test_pause_holds_off_snapshots() {
        let (builder, _db, paths, _temp) = create_test_builder();
        let builder = Arc::new(builder);

        let guard = builder.pause();
        let handle = {
            let builder = builder.clone();
            std::thread::spawn(move || builder.create_snapshot().unwrap())
        };
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(fs::read_dir(paths.backup_dir()).unwrap().count(), 0);

        drop(guard);
        let archive = handle.join().unwrap();
        assert!(archive.path.exists());
    }

    #[test]
    fn test_back_to_back_snapshots_get_distinct_names() {
        let (builder, _db, _paths, _temp) = create_test_builder();

        let first = builder.create_snapshot().unwrap();
        let second = builder.create_snapshot().unwrap();
        assert_ne!(first.filename, second.filename);
        assert!(second.created_at > first.created_at);
    }

    #[test]
    fn test_concurrent_snapshots_are_serialized() {
        let (builder, _db, paths, _temp) = create_test_builder();
        let builder = Arc::new(builder);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let builder = builder.clone();
                std::thread::spawn(move || builder.create_snapshot().unwrap())
            })
            .collect();
        let archives: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_ne!(archives[0].filename, archives[1].filename);
        for archive in &archives {
            assert!(inspect_archive(&archive.path).unwrap().is_restorable());
        }

        // No temporary archives left behind
        let names: Vec<_> = fs::read_dir(paths.backup_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".tar.gz")));
    }
}
