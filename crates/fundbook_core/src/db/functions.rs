//! SQL functions registered on every fund store connection.

use super::DbResult;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// `fund_fold(text)`: Unicode lowercase of `text`; `NULL` stays `NULL`.
///
/// Name filters compare `fund_fold(column)` against a pattern folded the
/// same way, so matching ignores case beyond ASCII.
pub const FOLD_FUNCTION: &str = "fund_fold";

/// Folds `value` the way `fund_fold` does in SQL.
pub fn fold_name(value: &str) -> String {
    value.to_lowercase()
}

pub(crate) fn register_functions(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|value| fold_name(&value)))
        },
    )?;
    Ok(())
}
