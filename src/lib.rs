//! Invoicer - backup and restore for the invoicing data store
//!
//! This library holds the data layer of the Invoicer application: the live
//! SQLite database, the `images/` and `pdfs/` asset trees that sit beside it,
//! and the backup subsystem that snapshots, catalogs, restores and schedules
//! archives of all three while the application keeps running.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Data root resolution and settings
//! - `error`: Custom error types
//! - `db`: Live connection ownership and the close/reopen handshake
//! - `backup`: Snapshots, catalog, restore and scheduling
//! - `cli`: Command handlers for the `invoicer` binary
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use invoicer::config::{InvoicerPaths, Settings};
//!
//! let paths = InvoicerPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use error::{InvoicerError, InvoicerResult};
