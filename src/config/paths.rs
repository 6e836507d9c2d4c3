//! Path management for Invoicer
//!
//! Resolves the data root and everything the backup subsystem touches
//! beneath it: the live database, the asset trees and the backup catalog.
//!
//! ## Path Resolution Order
//!
//! 1. `INVOICER_DATA_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_DATA_HOME/invoicer` or `~/.local/share/invoicer`
//! 3. Windows: `%APPDATA%\invoicer`

use std::path::PathBuf;

use crate::error::InvoicerError;

/// File name of the primary database inside the data root
pub const DATABASE_FILE: &str = "invoicer.db";

/// Optional asset directories that travel with every snapshot
pub const ASSET_DIRS: [&str; 2] = ["images", "pdfs"];

/// Manages all paths used by Invoicer
#[derive(Debug, Clone)]
pub struct InvoicerPaths {
    /// Data root holding the database file and the asset subdirectories
    base_dir: PathBuf,
    /// Catalog directory override from settings
    backup_dir: Option<PathBuf>,
}

impl InvoicerPaths {
    /// Create a new InvoicerPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, InvoicerError> {
        let base_dir = if let Ok(custom) = std::env::var("INVOICER_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self {
            base_dir,
            backup_dir: None,
        })
    }

    /// Create InvoicerPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            backup_dir: None,
        }
    }

    /// Override the backup catalog location
    pub fn with_backup_dir(mut self, backup_dir: Option<PathBuf>) -> Self {
        self.backup_dir = backup_dir;
        self
    }

    /// Get the data root
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the backup catalog directory (`<root>/backups/` unless overridden)
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("backups"))
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the live database file
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE)
    }

    /// SQLite sidecar files that belong to the live database
    pub fn database_sidecars(&self) -> Vec<PathBuf> {
        ["-wal", "-shm", "-journal"]
            .iter()
            .map(|suffix| self.base_dir.join(format!("{}{}", DATABASE_FILE, suffix)))
            .collect()
    }

    /// Safety copy of the live database taken right before a restore
    pub fn pre_restore_file(&self) -> PathBuf {
        self.base_dir.join(format!("{}.pre-restore", DATABASE_FILE))
    }

    /// Get the images asset directory
    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.join("images")
    }

    /// Get the PDF asset directory
    pub fn pdfs_dir(&self) -> PathBuf {
        self.base_dir.join("pdfs")
    }

    /// Resolve a named asset directory (`images` or `pdfs`)
    pub fn asset_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Ensure the data root and the backup directory exist
    ///
    /// Asset directories are optional and are never created here.
    pub fn ensure_directories(&self) -> Result<(), InvoicerError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| InvoicerError::Io(format!("Failed to create data directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_dir())
            .map_err(|e| InvoicerError::Io(format!("Failed to create backup directory: {}", e)))?;

        Ok(())
    }

    /// Check if Invoicer has been initialized (database file exists)
    pub fn is_initialized(&self) -> bool {
        self.database_file().exists()
    }
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, InvoicerError> {
    let data_base = match std::env::var("XDG_DATA_HOME") {
        Ok(xdg) => PathBuf::from(xdg),
        Err(_) => {
            let home = std::env::var("HOME").map_err(|_| {
                InvoicerError::Config("HOME environment variable not set".into())
            })?;
            PathBuf::from(home).join(".local").join("share")
        }
    };
    Ok(data_base.join("invoicer"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, InvoicerError> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| InvoicerError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("invoicer"))
}
