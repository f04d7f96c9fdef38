//! Fund aggregate domain model.
//!
//! # Responsibility
//! - Define the records read and written by the fund store.
//! - Define write inputs (`FundDraft`, `FundPatch`) and list queries.
//!
//! # Invariants
//! - A fund owns its aliases; companies and managers are only referenced.
//! - `start_year` lies within `[1900, current_year]` for every accepted write.

pub mod fund;
pub mod listing;
