//! Fund aggregate repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist a fund together with its aliases and company associations in
//!   one transaction.
//! - Serve filtered, paginated aggregate listings and the duplicate lookup.
//!
//! # Invariants
//! - Every aggregate write runs in a single `IMMEDIATE` transaction; any error
//!   drops the transaction, so no partial fund, alias or association survives.
//! - Re-attaching an already associated company is a no-op; no other
//!   constraint violation is tolerated.
//! - Alias and association cleanup on fund delete is left to `ON DELETE`
//!   cascade rules.

use crate::db::functions::{fold_name, register_functions};
use crate::db::DbError;
use crate::model::fund::{
    Company, CompanyId, Fund, FundAlias, FundDraft, FundId, FundManager, FundManagerId, FundPatch,
    FundRecord, FundValidationError,
};
use crate::model::listing::{FundPage, NormalizedFundQuery};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const FUND_SELECT_SQL: &str = "SELECT
    funds.id,
    funds.name,
    funds.start_year,
    funds.fund_manager_id,
    funds.created_at,
    funds.updated_at
FROM funds";

const REQUIRED_TABLES: &[&str] = &[
    "funds",
    "fund_aliases",
    "fund_managers",
    "companies",
    "company_fund",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for fund aggregate persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(FundValidationError),
    Db(DbError),
    FundNotFound(FundId),
    ManagerNotFound(FundManagerId),
    CompanyNotFound(CompanyId),
    /// Connection was not migrated to the fund schema.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::FundNotFound(id) => write!(f, "fund not found: {id}"),
            Self::ManagerNotFound(id) => write!(f, "fund manager not found: {id}"),
            Self::CompanyNotFound(id) => write!(f, "company not found: {id}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "fund repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted fund data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::FundNotFound(_) => None,
            Self::ManagerNotFound(_) => None,
            Self::CompanyNotFound(_) => None,
            Self::MissingRequiredTable(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<FundValidationError> for RepoError {
    fn from(value: FundValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Coarse classification of store failures surfaced by write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailureKind {
    /// Uniqueness, foreign-key, check or not-null violation.
    Constraint,
    /// Busy or locked database; the caller may retry.
    Transient,
    Other,
}

impl RepoError {
    /// Classifies the underlying SQLite failure, if any.
    pub fn failure_kind(&self) -> StoreFailureKind {
        let Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) = self else {
            return StoreFailureKind::Other;
        };
        match err.code {
            ErrorCode::ConstraintViolation => StoreFailureKind::Constraint,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreFailureKind::Transient,
            _ => StoreFailureKind::Other,
        }
    }
}

impl Display for StoreFailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constraint => write!(f, "constraint_violation"),
            Self::Transient => write!(f, "transient"),
            Self::Other => write!(f, "store_error"),
        }
    }
}

/// Repository interface for fund aggregate operations.
pub trait FundRepository {
    /// Inserts fund, aliases and associations atomically; returns the
    /// aggregate as committed.
    fn create_fund(&mut self, draft: &FundDraft) -> RepoResult<FundRecord>;
    /// Applies a partial update atomically; present child lists fully
    /// replace (aliases) or sync (companies) the stored sets.
    fn update_fund(&mut self, fund_id: FundId, patch: &FundPatch) -> RepoResult<FundRecord>;
    /// Deletes one fund; aliases and associations go with it.
    fn delete_fund(&mut self, fund_id: FundId) -> RepoResult<()>;
    /// Loads one fund aggregate.
    fn get_fund(&self, fund_id: FundId) -> RepoResult<Option<FundRecord>>;
    /// Lists one page of fund aggregates matching the filters.
    fn list_funds(&self, query: &NormalizedFundQuery) -> RepoResult<FundPage>;
    /// Whether another fund under the same manager carries any of `names` as
    /// its name or as one of its aliases.
    fn has_duplicate(
        &self,
        fund_id: FundId,
        fund_manager_id: Option<FundManagerId>,
        names: &[String],
    ) -> RepoResult<bool>;
}

/// SQLite-backed fund aggregate repository.
pub struct SqliteFundRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteFundRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_fund_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl FundRepository for SqliteFundRepository<'_> {
    fn create_fund(&mut self, draft: &FundDraft) -> RepoResult<FundRecord> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(manager_id) = draft.fund_manager_id {
            ensure_manager_exists(&tx, manager_id)?;
        }

        tx.execute(
            "INSERT INTO funds (name, start_year, fund_manager_id) VALUES (?1, ?2, ?3);",
            params![draft.name.as_str(), draft.start_year, draft.fund_manager_id],
        )?;
        let fund_id = tx.last_insert_rowid();

        insert_aliases(&tx, fund_id, &draft.aliases)?;
        attach_companies(&tx, fund_id, &draft.companies)?;

        let record = load_fund_record(&tx, fund_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("fund {fund_id} missing after insert"))
        })?;
        tx.commit()?;
        Ok(record)
    }

    fn update_fund(&mut self, fund_id: FundId, patch: &FundPatch) -> RepoResult<FundRecord> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !fund_exists(&tx, fund_id)? {
            return Err(RepoError::FundNotFound(fund_id));
        }
        if let Some(manager_id) = patch.fund_manager_id {
            ensure_manager_exists(&tx, manager_id)?;
        }

        if patch.touches_fund_row() {
            tx.execute(
                "UPDATE funds
                 SET
                    name = COALESCE(?2, name),
                    start_year = COALESCE(?3, start_year),
                    fund_manager_id = COALESCE(?4, fund_manager_id),
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    fund_id,
                    patch.name.as_deref(),
                    patch.start_year,
                    patch.fund_manager_id,
                ],
            )?;
        } else if patch.aliases.is_some() || patch.companies.is_some() {
            tx.execute(
                "UPDATE funds SET updated_at = (strftime('%s', 'now') * 1000) WHERE id = ?1;",
                [fund_id],
            )?;
        }

        if let Some(aliases) = patch.aliases.as_deref() {
            replace_aliases(&tx, fund_id, aliases)?;
        }
        if let Some(companies) = patch.companies.as_deref() {
            sync_companies(&tx, fund_id, companies)?;
        }

        let record = load_fund_record(&tx, fund_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("fund {fund_id} missing after update"))
        })?;
        tx.commit()?;
        Ok(record)
    }

    fn delete_fund(&mut self, fund_id: FundId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM funds WHERE id = ?1;", [fund_id])?;
        if changed == 0 {
            return Err(RepoError::FundNotFound(fund_id));
        }
        Ok(())
    }

    fn get_fund(&self, fund_id: FundId) -> RepoResult<Option<FundRecord>> {
        load_fund_record(self.conn, fund_id)
    }

    fn list_funds(&self, query: &NormalizedFundQuery) -> RepoResult<FundPage> {
        let mut filter_sql = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(name) = query.name.as_deref() {
            let pattern = format!("%{}%", escape_like(&fold_name(name)));
            filter_sql.push_str(
                " AND (
                    fund_fold(funds.name) LIKE ? ESCAPE '\\'
                    OR EXISTS (
                        SELECT 1
                        FROM fund_aliases fa
                        WHERE fa.fund_id = funds.id
                          AND fund_fold(fa.name) LIKE ? ESCAPE '\\'
                    )
                )",
            );
            bind_values.push(Value::Text(pattern.clone()));
            bind_values.push(Value::Text(pattern));
        }

        if let Some(manager_id) = query.fund_manager_id {
            filter_sql.push_str(" AND funds.fund_manager_id = ?");
            bind_values.push(Value::Integer(manager_id));
        }

        if let Some(start_year) = query.start_year {
            filter_sql.push_str(" AND funds.start_year = ?");
            bind_values.push(Value::Integer(i64::from(start_year)));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM funds{filter_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;
        let total = u64::try_from(total)
            .map_err(|_| RepoError::InvalidData(format!("negative fund count `{total}`")))?;

        let offset = i64::try_from(query.offset()).map_err(|_| {
            RepoError::InvalidData(format!("page offset {} out of range", query.offset()))
        })?;
        let mut sql = format!("{FUND_SELECT_SQL}{filter_sql} ORDER BY funds.id ASC LIMIT ? OFFSET ?");
        sql.push(';');
        bind_values.push(Value::Integer(i64::from(query.per_page)));
        bind_values.push(Value::Integer(offset));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let fund = parse_fund_row(row)?;
            items.push(load_relations(self.conn, fund)?);
        }

        Ok(FundPage::new(items, total, query))
    }

    fn has_duplicate(
        &self,
        fund_id: FundId,
        fund_manager_id: Option<FundManagerId>,
        names: &[String],
    ) -> RepoResult<bool> {
        if names.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT EXISTS(
                SELECT 1
                FROM funds f
                WHERE f.id <> ?
                  AND f.fund_manager_id IS ?
                  AND (
                    f.name IN ({placeholders})
                    OR EXISTS (
                        SELECT 1
                        FROM fund_aliases fa
                        WHERE fa.fund_id = f.id
                          AND fa.name IN ({placeholders})
                    )
                  )
            );"
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(2 + names.len() * 2);
        bind_values.push(Value::Integer(fund_id));
        bind_values.push(fund_manager_id.map_or(Value::Null, Value::Integer));
        for _ in 0..2 {
            bind_values.extend(names.iter().map(|name| Value::Text(name.clone())));
        }

        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        Ok(exists == 1)
    }
}

/// Inserts one alias row per name, in order.
fn insert_aliases(conn: &Connection, fund_id: FundId, aliases: &[String]) -> RepoResult<()> {
    let mut stmt = conn.prepare("INSERT INTO fund_aliases (fund_id, name) VALUES (?1, ?2);")?;
    for alias in aliases {
        stmt.execute(params![fund_id, alias.as_str()])?;
    }
    Ok(())
}

fn replace_aliases(conn: &Connection, fund_id: FundId, aliases: &[String]) -> RepoResult<()> {
    let removed = conn.execute("DELETE FROM fund_aliases WHERE fund_id = ?1;", [fund_id])?;
    insert_aliases(conn, fund_id, aliases)?;
    debug!(
        "event=fund_aliases_replace module=repo fund_id={fund_id} removed={removed} inserted={}",
        aliases.len()
    );
    Ok(())
}

/// Attaches companies, skipping pairs that are already associated.
fn attach_companies(conn: &Connection, fund_id: FundId, companies: &[CompanyId]) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO company_fund (company_id, fund_id)
         VALUES (?1, ?2)
         ON CONFLICT (company_id, fund_id) DO NOTHING;",
    )?;
    for company_id in companies {
        ensure_company_exists(conn, *company_id)?;
        stmt.execute(params![company_id, fund_id])?;
    }
    Ok(())
}

/// Makes the fund's association set equal to `companies`.
fn sync_companies(conn: &Connection, fund_id: FundId, companies: &[CompanyId]) -> RepoResult<()> {
    for company_id in companies {
        ensure_company_exists(conn, *company_id)?;
    }

    let current = load_company_ids(conn, fund_id)?;
    let desired: BTreeSet<CompanyId> = companies.iter().copied().collect();

    let detached: Vec<CompanyId> = current.difference(&desired).copied().collect();
    let attached: Vec<CompanyId> = desired.difference(&current).copied().collect();

    let mut detach_stmt =
        conn.prepare("DELETE FROM company_fund WHERE fund_id = ?1 AND company_id = ?2;")?;
    for company_id in &detached {
        detach_stmt.execute(params![fund_id, company_id])?;
    }
    attach_companies(conn, fund_id, &attached)?;

    debug!(
        "event=fund_companies_sync module=repo fund_id={fund_id} attached={} detached={}",
        attached.len(),
        detached.len()
    );
    Ok(())
}

fn load_company_ids(conn: &Connection, fund_id: FundId) -> RepoResult<BTreeSet<CompanyId>> {
    let mut stmt = conn.prepare("SELECT company_id FROM company_fund WHERE fund_id = ?1;")?;
    let mut rows = stmt.query([fund_id])?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        ids.insert(row.get(0)?);
    }
    Ok(ids)
}

fn load_fund_record(conn: &Connection, fund_id: FundId) -> RepoResult<Option<FundRecord>> {
    let fund = conn
        .query_row(
            &format!("{FUND_SELECT_SQL} WHERE funds.id = ?1;"),
            [fund_id],
            |row| Ok(parse_fund_row(row)),
        )
        .optional()?
        .transpose()?;

    match fund {
        Some(fund) => Ok(Some(load_relations(conn, fund)?)),
        None => Ok(None),
    }
}

fn load_relations(conn: &Connection, fund: Fund) -> RepoResult<FundRecord> {
    let fund_manager = match fund.fund_manager_id {
        Some(manager_id) => conn
            .query_row(
                "SELECT id, name FROM fund_managers WHERE id = ?1;",
                [manager_id],
                |row| {
                    Ok(FundManager {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                },
            )
            .optional()?,
        None => None,
    };

    let mut alias_stmt = conn.prepare(
        "SELECT id, fund_id, name
         FROM fund_aliases
         WHERE fund_id = ?1
         ORDER BY id ASC;",
    )?;
    let aliases = alias_stmt
        .query_map([fund.id], |row| {
            Ok(FundAlias {
                id: row.get("id")?,
                fund_id: row.get("fund_id")?,
                name: row.get("name")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut company_stmt = conn.prepare(
        "SELECT c.id, c.name
         FROM company_fund cf
         INNER JOIN companies c ON c.id = cf.company_id
         WHERE cf.fund_id = ?1
         ORDER BY c.id ASC;",
    )?;
    let companies = company_stmt
        .query_map([fund.id], |row| {
            Ok(Company {
                id: row.get("id")?,
                name: row.get("name")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(FundRecord {
        fund,
        fund_manager,
        aliases,
        companies,
    })
}

fn parse_fund_row(row: &Row<'_>) -> RepoResult<Fund> {
    let start_year: i64 = row.get("start_year")?;
    let start_year = i32::try_from(start_year).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid start year `{start_year}` in funds.start_year"
        ))
    })?;

    Ok(Fund {
        id: row.get("id")?,
        name: row.get("name")?,
        start_year,
        fund_manager_id: row.get("fund_manager_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn fund_exists(conn: &Connection, fund_id: FundId) -> RepoResult<bool> {
    row_exists(conn, "SELECT EXISTS(SELECT 1 FROM funds WHERE id = ?1);", fund_id)
}

fn ensure_manager_exists(conn: &Connection, manager_id: FundManagerId) -> RepoResult<()> {
    if row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM fund_managers WHERE id = ?1);",
        manager_id,
    )? {
        Ok(())
    } else {
        Err(RepoError::ManagerNotFound(manager_id))
    }
}

fn ensure_company_exists(conn: &Connection, company_id: CompanyId) -> RepoResult<()> {
    if row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM companies WHERE id = ?1);",
        company_id,
    )? {
        Ok(())
    } else {
        Err(RepoError::CompanyNotFound(company_id))
    }
}

fn row_exists(conn: &Connection, sql: &str, id: i64) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    Ok(exists == 1)
}

/// Escapes `LIKE` wildcards so user input only ever matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn ensure_fund_connection_ready(conn: &Connection) -> RepoResult<()> {
    for &table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    register_functions(conn)?;
    Ok(())
}
