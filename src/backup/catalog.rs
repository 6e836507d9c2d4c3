//! Listing, lookup and removal of published archives

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::archive::{validate_archive_name, BackupArchive};
use crate::error::{InvoicerError, InvoicerResult};

/// Read-only view over the backup directory
///
/// Only files following the archive naming convention are reported, so
/// in-progress temporary archives never show up.
#[derive(Debug, Clone)]
pub struct ArchiveCatalog {
    backup_dir: PathBuf,
    product: String,
}

impl ArchiveCatalog {
    /// Create a catalog over `backup_dir` for archives named after `product`
    pub fn new(backup_dir: PathBuf, product: impl Into<String>) -> Self {
        Self {
            backup_dir,
            product: product.into(),
        }
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Product name embedded in archive filenames
    pub fn product(&self) -> &str {
        &self.product
    }

    /// List all archives, newest first
    pub fn list_archives(&self) -> InvoicerResult<Vec<BackupArchive>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();

        for entry in fs::read_dir(&self.backup_dir).map_err(|e| {
            InvoicerError::Io(format!("Failed to read backup directory: {}", e))
        })? {
            let entry = entry.map_err(|e| {
                InvoicerError::Io(format!("Failed to read directory entry: {}", e))
            })?;

            if let Some(archive) = BackupArchive::from_path(&self.product, &entry.path()) {
                archives.push(archive);
            }
        }

        archives.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(archives)
    }

    /// Look up a single archive by filename
    pub fn get(&self, filename: &str) -> InvoicerResult<BackupArchive> {
        validate_archive_name(filename)?;

        let path = self.backup_dir.join(filename);
        if !path.is_file() {
            return Err(InvoicerError::backup_not_found(filename));
        }

        BackupArchive::from_path(&self.product, &path)
            .ok_or_else(|| InvoicerError::backup_not_found(filename))
    }

    /// Get the most recent archive
    pub fn latest(&self) -> InvoicerResult<Option<BackupArchive>> {
        Ok(self.list_archives()?.into_iter().next())
    }

    /// Delete an archive from the catalog
    pub fn delete(&self, filename: &str) -> InvoicerResult<()> {
        let archive = self.get(filename)?;
        fs::remove_file(&archive.path)
            .map_err(|e| InvoicerError::Io(format!("Failed to delete backup: {}", e)))?;
        info!(archive = %archive.filename, "Deleted backup");
        Ok(())
    }
}
