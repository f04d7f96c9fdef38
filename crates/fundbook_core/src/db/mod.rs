//! Fund store: SQLite connections, schema and SQL helpers.
//!
//! # Responsibility
//! - Hand out connections ready for the fund repositories.
//! - Own the fund schema: `funds`, `fund_aliases`, `company_fund`, the
//!   manager and company directory, and persisted `duplicate_warnings`.
//!
//! # Invariants
//! - Deleting a fund removes its aliases and company links (`ON DELETE
//!   CASCADE`); deleting a manager leaves its funds unmanaged (`SET NULL`).
//! - `fund_fold` is available on every opened connection.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod functions;
pub mod migrations;
mod open;

pub use functions::{fold_name, FOLD_FUNCTION};
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
