//! Fund manager and company directory repository.
//!
//! # Responsibility
//! - Provide CRUD for the records a fund references but does not own.
//!
//! # Invariants
//! - Deleting a manager nulls `funds.fund_manager_id` (store rule).
//! - Deleting a company removes only its association rows (store rule).

use crate::model::fund::{Company, CompanyId, FundManager, FundManagerId};
use crate::repo::fund_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for fund managers and companies.
pub trait DirectoryRepository {
    fn create_manager(&self, name: &str) -> RepoResult<FundManager>;
    fn get_manager(&self, id: FundManagerId) -> RepoResult<Option<FundManager>>;
    fn delete_manager(&self, id: FundManagerId) -> RepoResult<()>;
    fn create_company(&self, name: &str) -> RepoResult<Company>;
    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>>;
    fn delete_company(&self, id: CompanyId) -> RepoResult<()>;
}

/// SQLite-backed directory repository.
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn create_manager(&self, name: &str) -> RepoResult<FundManager> {
        self.conn.execute(
            "INSERT INTO fund_managers (name) VALUES (?1);",
            params![name.trim()],
        )?;
        Ok(FundManager {
            id: self.conn.last_insert_rowid(),
            name: name.trim().to_string(),
        })
    }

    fn get_manager(&self, id: FundManagerId) -> RepoResult<Option<FundManager>> {
        let manager = self
            .conn
            .query_row(
                "SELECT id, name FROM fund_managers WHERE id = ?1;",
                [id],
                |row| {
                    Ok(FundManager {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                },
            )
            .optional()?;
        Ok(manager)
    }

    fn delete_manager(&self, id: FundManagerId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM fund_managers WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::ManagerNotFound(id));
        }
        Ok(())
    }

    fn create_company(&self, name: &str) -> RepoResult<Company> {
        self.conn.execute(
            "INSERT INTO companies (name) VALUES (?1);",
            params![name.trim()],
        )?;
        Ok(Company {
            id: self.conn.last_insert_rowid(),
            name: name.trim().to_string(),
        })
    }

    fn get_company(&self, id: CompanyId) -> RepoResult<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, name FROM companies WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Company {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                },
            )
            .optional()?;
        Ok(company)
    }

    fn delete_company(&self, id: CompanyId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM companies WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::CompanyNotFound(id));
        }
        Ok(())
    }
}
