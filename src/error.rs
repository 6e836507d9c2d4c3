//! Custom error types for Invoicer
//!
//! This module defines the error hierarchy for the data layer using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for Invoicer operations
#[derive(Error, Debug)]
pub enum InvoicerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// SQLite errors raised by the live connection or the export step
    #[error("Database error: {0}")]
    Database(String),

    /// Malformed input: bad archive, bad cron expression, bad state transition
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// The operation was cancelled before it changed any live state
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl InvoicerError {
    /// Create a "not found" error for backup archives
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for the live database file
    pub fn database_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Database",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an invalid-input error
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Check if this is an I/O failure
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for InvoicerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for InvoicerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for InvoicerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for Invoicer operations
pub type InvoicerResult<T> = Result<T, InvoicerError>;
