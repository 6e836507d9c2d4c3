//! User settings for Invoicer
//!
//! Manages the preferences the data layer reads at startup: the snapshot
//! schedule, where archives are kept, and the log level.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::InvoicerPaths;
use crate::error::InvoicerError;

/// User settings for Invoicer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Product name embedded in archive filenames
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Five-field cron expression for automatic snapshots (empty disables)
    #[serde(default)]
    pub backup_schedule: String,

    /// Catalog directory override; defaults to `<data root>/backups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_product_name() -> String {
    "invoicer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            product_name: default_product_name(),
            backup_schedule: String::new(),
            backup_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Whether a recurring snapshot schedule is configured
    pub fn is_schedule_enabled(&self) -> bool {
        !self.backup_schedule.trim().is_empty()
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &InvoicerPaths) -> Result<Self, InvoicerError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                InvoicerError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                InvoicerError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &InvoicerPaths) -> Result<(), InvoicerError> {
        std::fs::create_dir_all(paths.base_dir())
            .map_err(|e| InvoicerError::Io(format!("Failed to create data directory: {}", e)))?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            InvoicerError::Config(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents).map_err(|e| {
            InvoicerError::Io(format!("Failed to write settings file: {}", e))
        })?;

        Ok(())
    }
}
