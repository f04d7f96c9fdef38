//! Duplicate-fund heuristic.
//!
//! A fund is a potential duplicate when another fund under the same manager
//! shares its name or one of its aliases, either as that fund's name or as one
//! of that fund's aliases. Matching is exact; funds without a manager are only
//! compared with other manager-less funds.

use crate::model::fund::FundRecord;
use crate::repo::fund_repo::{FundRepository, RepoResult};

/// Returns the fund name followed by its alias names, without repeats.
pub fn candidate_names(record: &FundRecord) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(record.aliases.len() + 1);
    for name in std::iter::once(record.fund.name.as_str()).chain(record.alias_names()) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Checks `record` against every other fund of the same manager.
pub fn has_potential_duplicate<R: FundRepository + ?Sized>(
    repo: &R,
    record: &FundRecord,
) -> RepoResult<bool> {
    repo.has_duplicate(
        record.id(),
        record.fund.fund_manager_id,
        &candidate_names(record),
    )
}
