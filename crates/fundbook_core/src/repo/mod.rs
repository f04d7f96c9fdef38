//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Aggregate writes are atomic; services never open transactions themselves.
//! - Repository APIs return semantic errors (`FundNotFound`, ...) in addition
//!   to DB transport errors.

pub mod directory_repo;
pub mod fund_repo;
pub mod warning_repo;
