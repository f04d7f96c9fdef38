//! Fund use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the post-commit side effects of fund writes: listing cache
//!   invalidation and duplicate detection.

pub mod duplicate_detector;
pub mod fund_query_cache;
pub mod fund_service;
