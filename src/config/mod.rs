//! Configuration module for Invoicer
//!
//! This module provides configuration management including:
//! - Data root and backup catalog path resolution
//! - User settings persistence

pub mod paths;
pub mod settings;

pub use paths::InvoicerPaths;
pub use settings::Settings;
