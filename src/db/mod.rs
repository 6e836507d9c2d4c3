//! Live database ownership for Invoicer
//!
//! The application keeps exactly one SQLite connection open against
//! `invoicer.db`. The backup subsystem never owns that connection; it talks to
//! it through [`ConnectionHandle`], which covers checkpointing and the
//! close/reopen handshake around a restore.
//!
//! # Connection lifecycle
//!
//! ```text
//!   Open --close()--> Closed --mark_pending_reopen()--> PendingReopen
//!    ^                  |                                   |
//!    +----reopen()------+-----------reopen()----------------+
//! ```
//!
//! `mark_pending_reopen` is only valid from `Closed` and is only called after a
//! successful restore. Reopening from `PendingReopen` acknowledges the restore.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{InvoicerError, InvoicerResult};

/// State of the live connection as seen by the backup subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connection is open and serving requests
    Open,
    /// Connection was released, typically ahead of a restore
    Closed,
    /// Live files were replaced; the owner must reopen before serving again
    PendingReopen,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::PendingReopen => write!(f, "pending reopen"),
        }
    }
}

/// Contract between the backup subsystem and whoever owns the live connection
pub trait ConnectionHandle: Send + Sync {
    /// Flush the write-ahead log into the main database file
    fn checkpoint(&self) -> InvoicerResult<()>;

    /// Release the live connection
    fn close(&self) -> InvoicerResult<()>;

    /// Open the connection again, acknowledging a pending restore
    fn reopen(&self) -> InvoicerResult<()>;

    /// Flag that live files changed underneath a closed connection
    fn mark_pending_reopen(&self) -> InvoicerResult<()>;

    /// Current connection status
    fn status(&self) -> ConnectionStatus;

    /// Whether a restore is waiting for the owner to reopen
    fn needs_reopen(&self) -> bool {
        self.status() == ConnectionStatus::PendingReopen
    }
}

struct DatabaseState {
    conn: Option<Connection>,
    status: ConnectionStatus,
}

/// Owner of the application's single SQLite connection
pub struct Database {
    path: PathBuf,
    state: Mutex<DatabaseState>,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode
    pub fn open(path: impl AsRef<Path>) -> InvoicerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path)?;
        info!(path = %path.display(), "Opened database");

        Ok(Self {
            path,
            state: Mutex::new(DatabaseState {
                conn: Some(conn),
                status: ConnectionStatus::Open,
            }),
        })
    }

    /// Path of the live database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against the live connection
    ///
    /// Fails with `Invalid` while the connection is closed or awaiting reopen.
    pub fn with_connection<T, F>(&self, f: F) -> InvoicerResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let state = self.state.lock();
        match state.conn.as_ref() {
            Some(conn) => f(conn).map_err(InvoicerError::from),
            None => Err(InvoicerError::Invalid(format!(
                "database connection is {}",
                state.status
            ))),
        }
    }
}

impl ConnectionHandle for Database {
    fn checkpoint(&self) -> InvoicerResult<()> {
        self.with_connection(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        })?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn close(&self) -> InvoicerResult<()> {
        let mut state = self.state.lock();
        let Some(conn) = state.conn.take() else {
            return Ok(());
        };

        if let Err((conn, e)) = conn.close() {
            state.conn = Some(conn);
            return Err(InvoicerError::Database(format!(
                "Failed to close database: {}",
                e
            )));
        }

        state.status = ConnectionStatus::Closed;
        info!(path = %self.path.display(), "Closed database connection");
        Ok(())
    }

    fn reopen(&self) -> InvoicerResult<()> {
        let mut state = self.state.lock();
        if state.status == ConnectionStatus::Open {
            return Ok(());
        }

        let acknowledged = state.status == ConnectionStatus::PendingReopen;
        state.conn = Some(open_connection(&self.path)?);
        state.status = ConnectionStatus::Open;
        info!(
            path = %self.path.display(),
            after_restore = acknowledged,
            "Reopened database connection"
        );
        Ok(())
    }

    fn mark_pending_reopen(&self) -> InvoicerResult<()> {
        let mut state = self.state.lock();
        if state.status != ConnectionStatus::Closed {
            return Err(InvoicerError::Invalid(format!(
                "cannot request reopen while connection is {}",
                state.status
            )));
        }
        state.status = ConnectionStatus::PendingReopen;
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }
}

fn open_connection(path: &Path) -> InvoicerResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| InvoicerError::Io(format!("Failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(path)
        .map_err(|e| InvoicerError::Database(format!("Failed to open {}: {}", path.display(), e)))?;

    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    debug!(journal_mode = %mode, "Configured journal mode");

    Ok(conn)
}
