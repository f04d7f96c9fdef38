//! Fund aggregate use-case service.
//!
//! # Responsibility
//! - Validate fund writes and delegate them to the transactional repository.
//! - Run post-commit side effects explicitly: listing cache flush on every
//!   mutation, duplicate detection and warning dispatch on create.
//! - Serve cached listings and uncached single-fund reads.
//!
//! # Invariants
//! - Post-commit side effects are best effort; their failures are logged and
//!   never turn a committed write into an error.
//! - Validation and not-found errors are surfaced unchanged; other store
//!   failures are wrapped with the operation and fund they belong to.

use crate::cache::TaggedCache;
use crate::config::CoreConfig;
use crate::model::fund::{
    current_year, CompanyId, FundDraft, FundId, FundManagerId, FundPatch, FundRecord,
    FundValidationError,
};
use crate::model::listing::{FundListQuery, FundPage};
use crate::notify::{DuplicateFundWarning, DuplicateNotifier};
use crate::repo::fund_repo::{FundRepository, RepoError, StoreFailureKind};
use crate::service::duplicate_detector::has_potential_duplicate;
use crate::service::fund_query_cache::FundQueryCache;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Aggregate write operation, used to label wrapped failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundOperation {
    Create,
    Update,
    Delete,
}

impl FundOperation {
    fn event(self) -> &'static str {
        match self {
            Self::Create => "fund_create",
            Self::Update => "fund_update",
            Self::Delete => "fund_delete",
        }
    }
}

impl Display for FundOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "creating"),
            Self::Update => write!(f, "updating"),
            Self::Delete => write!(f, "deleting"),
        }
    }
}

/// Service error for fund use-cases.
#[derive(Debug)]
pub enum FundServiceError {
    /// Field values rejected before touching the store.
    Validation(FundValidationError),
    FundNotFound(FundId),
    ManagerNotFound(FundManagerId),
    CompanyNotFound(CompanyId),
    /// Store failure during an aggregate write; the transaction was rolled
    /// back.
    OperationFailed {
        operation: FundOperation,
        /// Fund name, or `#<id>` when the write did not carry a name.
        fund_name: String,
        kind: StoreFailureKind,
        source: RepoError,
    },
    /// Store failure while reading.
    Query(RepoError),
}

impl FundServiceError {
    fn from_write(operation: FundOperation, fund_name: String, err: RepoError) -> Self {
        match err {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::FundNotFound(id) => Self::FundNotFound(id),
            RepoError::ManagerNotFound(id) => Self::ManagerNotFound(id),
            RepoError::CompanyNotFound(id) => Self::CompanyNotFound(id),
            other => Self::OperationFailed {
                operation,
                fund_name,
                kind: other.failure_kind(),
                source: other,
            },
        }
    }

    fn from_read(err: RepoError) -> Self {
        match err {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::FundNotFound(id) => Self::FundNotFound(id),
            other => Self::Query(other),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::OperationFailed {
                kind: StoreFailureKind::Transient,
                ..
            }
        )
    }
}

impl Display for FundServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::FundNotFound(id) => write!(f, "fund not found: {id}"),
            Self::ManagerNotFound(id) => write!(f, "fund manager not found: {id}"),
            Self::CompanyNotFound(id) => write!(f, "company not found: {id}"),
            Self::OperationFailed {
                operation,
                fund_name,
                source,
                ..
            } => write!(f, "{operation} fund: {fund_name}: {source}"),
            Self::Query(err) => write!(f, "querying funds: {err}"),
        }
    }
}

impl Error for FundServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::OperationFailed { source, .. } => Some(source),
            Self::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FundValidationError> for FundServiceError {
    fn from(value: FundValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Fund aggregate writer and query facade.
pub struct FundService<R: FundRepository, C: TaggedCache> {
    repo: R,
    query_cache: FundQueryCache<C>,
    notifier: Option<DuplicateNotifier>,
}

impl<R: FundRepository, C: TaggedCache> FundService<R, C> {
    /// Creates a service without a warning queue; duplicates are only logged.
    pub fn new(repo: R, cache: C, config: &CoreConfig) -> Self {
        Self {
            repo,
            query_cache: FundQueryCache::new(cache, config),
            notifier: None,
        }
    }

    /// Routes duplicate warnings to `notifier`.
    pub fn with_notifier(mut self, notifier: DuplicateNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn query_cache(&self) -> &FundQueryCache<C> {
        &self.query_cache
    }

    /// Lists one page of funds, served from cache when possible.
    pub fn list_funds(&self, query: &FundListQuery) -> Result<FundPage, FundServiceError> {
        self.query_cache
            .list(&self.repo, query)
            .map_err(FundServiceError::from_read)
    }

    /// Loads one fund aggregate directly from the store.
    pub fn get_fund(&self, fund_id: FundId) -> Result<FundRecord, FundServiceError> {
        self.repo
            .get_fund(fund_id)
            .map_err(FundServiceError::from_read)?
            .ok_or(FundServiceError::FundNotFound(fund_id))
    }

    /// Creates a fund with its aliases and company associations.
    ///
    /// # Side effects
    /// - Flushes cached listings after commit.
    /// - Runs duplicate detection after commit and enqueues a warning when
    ///   another fund of the same manager shares a name or alias.
    pub fn create_fund(&mut self, draft: &FundDraft) -> Result<FundRecord, FundServiceError> {
        let started_at = Instant::now();
        let draft = draft.normalized(current_year())?;

        let record = match self.repo.create_fund(&draft) {
            Ok(record) => record,
            Err(err) => {
                return Err(self.write_failed(FundOperation::Create, draft.name, err, started_at))
            }
        };

        info!(
            "event=fund_create module=service status=ok fund_id={} aliases={} companies={} duration_ms={}",
            record.id(),
            record.aliases.len(),
            record.companies.len(),
            started_at.elapsed().as_millis()
        );

        self.query_cache.invalidate();
        self.flag_duplicates(&record);
        Ok(record)
    }

    /// Applies a partial update to one fund.
    ///
    /// A present `aliases` list replaces all aliases and a present `companies`
    /// list becomes the exact association set; empty lists clear them.
    ///
    /// # Side effects
    /// - Flushes cached listings after commit.
    pub fn update_fund(
        &mut self,
        fund_id: FundId,
        patch: &FundPatch,
    ) -> Result<FundRecord, FundServiceError> {
        let started_at = Instant::now();
        let patch = patch.normalized(current_year())?;

        let record = match self.repo.update_fund(fund_id, &patch) {
            Ok(record) => record,
            Err(err) => {
                let fund_name = patch.name.clone().unwrap_or_else(|| format!("#{fund_id}"));
                return Err(self.write_failed(FundOperation::Update, fund_name, err, started_at));
            }
        };

        info!(
            "event=fund_update module=service status=ok fund_id={fund_id} aliases_replaced={} companies_synced={} duration_ms={}",
            patch.aliases.is_some(),
            patch.companies.is_some(),
            started_at.elapsed().as_millis()
        );

        self.query_cache.invalidate();
        Ok(record)
    }

    /// Deletes one fund; the store removes its aliases and associations.
    ///
    /// # Side effects
    /// - Flushes cached listings after the delete.
    pub fn delete_fund(&mut self, fund_id: FundId) -> Result<(), FundServiceError> {
        let started_at = Instant::now();
        if let Err(err) = self.repo.delete_fund(fund_id) {
            return Err(self.write_failed(
                FundOperation::Delete,
                format!("#{fund_id}"),
                err,
                started_at,
            ));
        }

        info!(
            "event=fund_delete module=service status=ok fund_id={fund_id} duration_ms={}",
            started_at.elapsed().as_millis()
        );

        self.query_cache.invalidate();
        Ok(())
    }

    /// Whether another fund of the same manager shares a name or alias with
    /// `record`.
    pub fn check_for_duplicates(&self, record: &FundRecord) -> Result<bool, FundServiceError> {
        has_potential_duplicate(&self.repo, record).map_err(FundServiceError::Query)
    }

    fn flag_duplicates(&self, record: &FundRecord) {
        match self.check_for_duplicates(record) {
            Ok(false) => {
                debug!(
                    "event=fund_duplicate_check module=service status=clean fund_id={}",
                    record.id()
                );
            }
            Ok(true) => {
                let warning = DuplicateFundWarning::for_fund(record);
                match self.notifier.as_ref() {
                    Some(notifier) => {
                        if let Err(err) = notifier.notify(warning) {
                            warn!(
                                "event=fund_duplicate_check module=service status=error fund_id={} error_code=notify_failed error={err}",
                                record.id()
                            );
                        }
                    }
                    None => warn!(
                        "event=fund_duplicate_check module=service status=detected fund_id={} message=\"{}\"",
                        record.id(),
                        warning.message()
                    ),
                }
            }
            Err(err) => {
                warn!(
                    "event=fund_duplicate_check module=service status=error fund_id={} error_code=check_failed error={err}",
                    record.id()
                );
            }
        }
    }

    fn write_failed(
        &self,
        operation: FundOperation,
        fund_name: String,
        err: RepoError,
        started_at: Instant,
    ) -> FundServiceError {
        let err = FundServiceError::from_write(operation, fund_name, err);
        error!(
            "event={} module=service status=error duration_ms={} error={}",
            operation.event(),
            started_at.elapsed().as_millis(),
            err
        );
        err
    }
}
