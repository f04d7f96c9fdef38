//! Persisted duplicate-fund warnings.
//!
//! # Responsibility
//! - Store warnings delivered by the notification worker.
//! - List stored warnings for review.
//!
//! # Invariants
//! - `event_id` is unique; redelivering the same warning is a no-op.

use crate::model::fund::{FundId, FundManagerId};
use crate::notify::DuplicateFundWarning;
use crate::repo::fund_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Stored duplicate warning row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateWarningRecord {
    pub event_id: Uuid,
    pub fund_id: FundId,
    pub fund_name: String,
    pub fund_manager_id: Option<FundManagerId>,
    /// Epoch milliseconds at detection time.
    pub detected_at: i64,
}

/// Inserts one warning. Returns `false` when the event was already stored.
pub fn insert_duplicate_warning(
    conn: &Connection,
    warning: &DuplicateFundWarning,
) -> RepoResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO duplicate_warnings (
            event_id,
            fund_id,
            fund_name,
            fund_manager_id,
            detected_at
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            warning.event_id.to_string(),
            warning.fund_id,
            warning.fund_name.as_str(),
            warning.fund_manager_id,
            warning.detected_at,
        ],
    )?;
    Ok(inserted == 1)
}

/// Lists stored warnings, newest first.
pub fn list_duplicate_warnings(conn: &Connection) -> RepoResult<Vec<DuplicateWarningRecord>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, fund_id, fund_name, fund_manager_id, detected_at
         FROM duplicate_warnings
         ORDER BY detected_at DESC, id DESC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut warnings = Vec::new();
    while let Some(row) = rows.next()? {
        let event_text: String = row.get("event_id")?;
        let event_id = Uuid::parse_str(&event_text).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid uuid value `{event_text}` in duplicate_warnings.event_id"
            ))
        })?;
        warnings.push(DuplicateWarningRecord {
            event_id,
            fund_id: row.get("fund_id")?,
            fund_name: row.get("fund_name")?,
            fund_manager_id: row.get("fund_manager_id")?,
            detected_at: row.get("detected_at")?,
        });
    }
    Ok(warnings)
}
