//! Built-in warning listeners.

use super::{DuplicateFundWarning, ListenerError, WarningListener};
use crate::db::{open_db, DbResult};
use crate::repo::warning_repo::insert_duplicate_warning;
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;

/// Writes each warning to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWarningListener;

impl WarningListener for LogWarningListener {
    fn on_warning(&mut self, warning: &DuplicateFundWarning) -> Result<(), ListenerError> {
        warn!(
            "event=duplicate_fund_warning module=notify status=detected event_id={} fund_id={} message=\"{}\"",
            warning.event_id,
            warning.fund_id,
            warning.message()
        );
        Ok(())
    }
}

/// Persists each warning to `duplicate_warnings` and logs it.
///
/// Owns its own connection, since the worker runs on a separate thread.
pub struct SqliteWarningListener {
    conn: Connection,
}

impl SqliteWarningListener {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (and migrates) the database file at `path` for the listener.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl WarningListener for SqliteWarningListener {
    fn on_warning(&mut self, warning: &DuplicateFundWarning) -> Result<(), ListenerError> {
        let inserted = insert_duplicate_warning(&self.conn, warning)?;
        if inserted {
            warn!(
                "event=duplicate_fund_warning module=notify status=recorded event_id={} fund_id={} message=\"{}\"",
                warning.event_id,
                warning.fund_id,
                warning.message()
            );
        } else {
            info!(
                "event=duplicate_fund_warning module=notify status=redelivered event_id={} fund_id={}",
                warning.event_id, warning.fund_id
            );
        }
        Ok(())
    }
}
