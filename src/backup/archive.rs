//! Archive naming and layout
//!
//! Every snapshot is a gzip-compressed tar file named
//! `<product>-backup-<YYYY-MM-DD_HHMMSS>.tar.gz` holding:
//!
//! - `database.db` (required)
//! - `images/...` (optional)
//! - `pdfs/...` (optional)
//!
//! The timestamp in the name is always UTC, while cron schedules are evaluated
//! in local time. A `0 2 * * *` schedule outside UTC therefore produces names
//! whose `HHMMSS` is 02:00 shifted by the local offset.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{InvoicerError, InvoicerResult};

/// Entry name of the database snapshot inside an archive
pub const DATABASE_ENTRY: &str = "database.db";

/// Extension shared by all published archives
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// One completed snapshot in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    /// Archive filename
    pub filename: String,
    /// Absolute path to the archive
    pub path: PathBuf,
    /// Size in bytes
    pub size_bytes: u64,
    /// Creation time, taken from the timestamp embedded in the filename
    pub created_at: DateTime<Utc>,
    /// Last modification time reported by the filesystem
    pub modified_at: Option<DateTime<Utc>>,
}

impl BackupArchive {
    /// Build catalog metadata for a file, if it follows the naming convention
    pub fn from_path(product: &str, path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_string_lossy().to_string();
        let created_at = parse_archive_timestamp(product, &filename)?;

        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        Some(Self {
            filename,
            path,
            size_bytes: metadata.len(),
            created_at,
            modified_at,
        })
    }
}

/// Derive the archive filename for a snapshot taken at `at`
pub fn archive_filename(product: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-backup-{}{}",
        product,
        at.format(TIMESTAMP_FORMAT),
        ARCHIVE_EXTENSION
    )
}

/// Parse the timestamp out of an archive filename
///
/// Returns `None` for anything that does not follow the naming convention,
/// including in-progress temporary files.
pub fn parse_archive_timestamp(product: &str, filename: &str) -> Option<DateTime<Utc>> {
    let stamp = filename
        .strip_prefix(product)?
        .strip_prefix("-backup-")?
        .strip_suffix(ARCHIVE_EXTENSION)?;

    if stamp.len() != 17 {
        return None;
    }

    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Reject archive names that could escape the backup directory
pub fn validate_archive_name(name: &str) -> InvoicerResult<()> {
    let mut components = Path::new(name).components();
    let is_plain_file = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if name.is_empty() || !is_plain_file || name.contains(['/', '\\']) {
        return Err(InvoicerError::Invalid(format!(
            "'{}' is not a plain archive filename",
            name
        )));
    }
    Ok(())
}

/// Summary of what an archive holds, read without extracting it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveContents {
    /// Whether the required database entry is present
    pub has_database: bool,
    /// Uncompressed size of the database entry
    pub database_size: u64,
    /// Number of files under `images/`
    pub image_files: usize,
    /// Number of files under `pdfs/`
    pub pdf_files: usize,
}

impl ArchiveContents {
    /// An archive is restorable when it carries a non-empty database
    pub fn is_restorable(&self) -> bool {
        self.has_database && self.database_size > 0
    }
}

/// List the entries of an archive and tally them
pub fn inspect_archive(path: &Path) -> InvoicerResult<ArchiveContents> {
    let file = File::open(path)
        .map_err(|e| InvoicerError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive
        .entries()
        .map_err(|e| InvoicerError::Io(format!("Failed to read archive: {}", e)))?;

    let mut contents = ArchiveContents::default();
    for entry in entries {
        let entry =
            entry.map_err(|e| InvoicerError::Io(format!("Failed to read archive entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| InvoicerError::Io(format!("Bad entry path: {}", e)))?
            .into_owned();

        if entry_path == Path::new(DATABASE_ENTRY) {
            contents.has_database = true;
            contents.database_size = entry.size();
        } else if entry_path.starts_with("images") {
            contents.image_files += 1;
        } else if entry_path.starts_with("pdfs") {
            contents.pdf_files += 1;
        }
    }

    Ok(contents)
}
