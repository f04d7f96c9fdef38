//! Core domain logic for Fundbook.
//! This crate owns the fund aggregate: its storage, write consistency,
//! cached listings and duplicate warnings.

pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;

pub use cache::{CacheError, InMemoryTaggedCache, TaggedCache};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, logging_status, parse_log_level, report_error, LoggingError,
    LoggingStatus,
};
pub use model::fund::{
    Company, CompanyId, Fund, FundAlias, FundDraft, FundId, FundManager, FundManagerId,
    FundPatch, FundRecord, FundValidationError,
};
pub use model::listing::{FundListQuery, FundPage, NormalizedFundQuery};
pub use notify::{
    spawn_notifier, DeliveryStats, DuplicateFundWarning, DuplicateNotifier, ListenerError,
    LogWarningListener, NotifierHandle, NotifyError, SqliteWarningListener, WarningListener,
};
pub use repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
pub use repo::fund_repo::{
    FundRepository, RepoError, RepoResult, SqliteFundRepository, StoreFailureKind,
};
pub use repo::warning_repo::{list_duplicate_warnings, DuplicateWarningRecord};
pub use service::fund_query_cache::FundQueryCache;
pub use service::fund_service::{FundOperation, FundService, FundServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
