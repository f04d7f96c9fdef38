//! Fund list query and page models.
//!
//! # Responsibility
//! - Normalize raw filter/pagination input into one effective query.
//! - Define the paginated result envelope shared by store and cache.
//!
//! # Invariants
//! - Blank name, zero manager id and zero start year mean "no filter".
//! - Normalized `per_page` lies within `[1, max_per_page]`; `page` is >= 1.

use crate::model::fund::{FundManagerId, FundRecord, FundValidationError};
use serde::{Deserialize, Serialize};

/// Raw list request, as received from the API layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundListQuery {
    /// Substring matched against fund names and aliases.
    pub name: Option<String>,
    pub fund_manager_id: Option<FundManagerId>,
    pub start_year: Option<i32>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl FundListQuery {
    /// Builds a query from unordered string key/value pairs.
    ///
    /// Recognized keys: `name`, `fund_manager` (or `fund_manager_id`),
    /// `start_year`, `per_page`, `page`. Unknown keys are ignored, empty values
    /// are treated as absent, and a repeated key keeps its last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, FundValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }

            match key {
                "name" => query.name = Some(value.to_string()),
                "fund_manager" | "fund_manager_id" => {
                    query.fund_manager_id = Some(parse_param(key, value)?)
                }
                "start_year" => query.start_year = Some(parse_param(key, value)?),
                "per_page" => query.per_page = Some(parse_param(key, value)?),
                "page" => query.page = Some(parse_param(key, value)?),
                _ => {}
            }
        }
        Ok(query)
    }

    /// Resolves defaults and clamps pagination.
    pub fn normalized(&self, default_per_page: u32, max_per_page: u32) -> NormalizedFundQuery {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        NormalizedFundQuery {
            name,
            fund_manager_id: self.fund_manager_id.filter(|id| *id != 0),
            start_year: self.start_year.filter(|year| *year != 0),
            per_page: normalize_per_page(self.per_page, default_per_page, max_per_page),
            page: self.page.filter(|page| *page > 0).unwrap_or(1),
        }
    }
}

/// Effective list query after normalization.
///
/// Field order is fixed, so its serialized form is a stable fingerprint input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedFundQuery {
    pub name: Option<String>,
    pub fund_manager_id: Option<FundManagerId>,
    pub start_year: Option<i32>,
    pub per_page: u32,
    pub page: u32,
}

impl NormalizedFundQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// One page of fund aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundPage {
    pub items: Vec<FundRecord>,
    /// Number of funds matching the filters across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub last_page: u32,
}

impl FundPage {
    pub fn new(items: Vec<FundRecord>, total: u64, query: &NormalizedFundQuery) -> Self {
        let per_page = u64::from(query.per_page.max(1));
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
        }
    }
}

/// Never returns zero, even for a zero `default_per_page` or `max_per_page`.
fn normalize_per_page(per_page: Option<u32>, default_per_page: u32, max_per_page: u32) -> u32 {
    let max_per_page = max_per_page.max(1);
    match per_page {
        Some(0) | None => default_per_page.clamp(1, max_per_page),
        Some(value) => value.min(max_per_page),
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, FundValidationError> {
    value
        .parse()
        .map_err(|_| FundValidationError::InvalidQueryParam {
            key: key.to_string(),
            value: value.to_string(),
        })
}
