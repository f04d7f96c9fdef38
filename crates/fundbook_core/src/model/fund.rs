//! Fund aggregate records and write inputs.
//!
//! # Responsibility
//! - Describe the persisted shape of funds, aliases, managers and companies.
//! - Normalize and validate create/update inputs before they reach storage.
//!
//! # Invariants
//! - Fund names are non-blank after trimming.
//! - Blank alias entries are dropped; remaining entries are trimmed but never
//!   deduplicated.
//! - A present-but-empty `aliases`/`companies` list in a patch means "clear",
//!   not "leave untouched".

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type FundId = i64;
pub type FundManagerId = i64;
pub type CompanyId = i64;

/// Earliest accepted fund start year.
pub const MIN_START_YEAR: i32 = 1900;

/// Returns the current calendar year in UTC.
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Fund row as stored in `funds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund {
    pub id: FundId,
    pub name: String,
    pub start_year: i32,
    pub fund_manager_id: Option<FundManagerId>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Alternative name owned by exactly one fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundAlias {
    pub id: i64,
    pub fund_id: FundId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundManager {
    pub id: FundManagerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
}

/// Fund aggregate with manager, aliases and companies loaded eagerly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundRecord {
    #[serde(flatten)]
    pub fund: Fund,
    pub fund_manager: Option<FundManager>,
    /// Ordered by alias id, i.e. insertion order.
    pub aliases: Vec<FundAlias>,
    /// Ordered by company id.
    pub companies: Vec<Company>,
}

impl FundRecord {
    pub fn id(&self) -> FundId {
        self.fund.id
    }

    pub fn alias_names(&self) -> Vec<&str> {
        self.aliases.iter().map(|alias| alias.name.as_str()).collect()
    }

    pub fn company_ids(&self) -> Vec<CompanyId> {
        self.companies.iter().map(|company| company.id).collect()
    }
}

/// Validation failures for fund inputs and list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundValidationError {
    BlankName,
    StartYearOutOfRange { year: i32, min: i32, max: i32 },
    InvalidQueryParam { key: String, value: String },
}

impl Display for FundValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "fund name must not be blank"),
            Self::StartYearOutOfRange { year, min, max } => {
                write!(f, "start year {year} must be between {min} and {max}")
            }
            Self::InvalidQueryParam { key, value } => {
                write!(f, "invalid value `{value}` for query parameter `{key}`")
            }
        }
    }
}

impl Error for FundValidationError {}

/// Input for creating one fund aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundDraft {
    pub name: String,
    pub start_year: i32,
    pub fund_manager_id: Option<FundManagerId>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub companies: Vec<CompanyId>,
}

impl FundDraft {
    pub fn new(name: impl Into<String>, start_year: i32) -> Self {
        Self {
            name: name.into(),
            start_year,
            ..Self::default()
        }
    }

    pub fn with_manager(mut self, fund_manager_id: FundManagerId) -> Self {
        self.fund_manager_id = Some(fund_manager_id);
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_companies(mut self, companies: impl IntoIterator<Item = CompanyId>) -> Self {
        self.companies = companies.into_iter().collect();
        self
    }

    /// Returns a trimmed copy of this draft after validating field values.
    ///
    /// Reference existence (manager, companies) is checked by the store inside
    /// the write transaction, not here.
    pub fn normalized(&self, current_year: i32) -> Result<Self, FundValidationError> {
        Ok(Self {
            name: normalize_name(&self.name)?,
            start_year: validate_start_year(self.start_year, current_year)?,
            fund_manager_id: self.fund_manager_id,
            aliases: normalize_aliases(&self.aliases),
            companies: self.companies.clone(),
        })
    }
}

/// Partial update for one fund aggregate.
///
/// `None` leaves the attribute or child set untouched. `Some(vec![])` for
/// `aliases` or `companies` clears that child set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundPatch {
    pub name: Option<String>,
    pub start_year: Option<i32>,
    pub fund_manager_id: Option<FundManagerId>,
    pub aliases: Option<Vec<String>>,
    pub companies: Option<Vec<CompanyId>>,
}

impl FundPatch {
    /// Returns a trimmed copy of this patch after validating supplied fields.
    pub fn normalized(&self, current_year: i32) -> Result<Self, FundValidationError> {
        let name = match self.name.as_deref() {
            Some(name) => Some(normalize_name(name)?),
            None => None,
        };
        let start_year = match self.start_year {
            Some(year) => Some(validate_start_year(year, current_year)?),
            None => None,
        };

        Ok(Self {
            name,
            start_year,
            fund_manager_id: self.fund_manager_id,
            aliases: self.aliases.as_deref().map(normalize_aliases),
            companies: self.companies.clone(),
        })
    }

    /// Whether any column of the `funds` row itself is touched.
    pub fn touches_fund_row(&self) -> bool {
        self.name.is_some() || self.start_year.is_some() || self.fund_manager_id.is_some()
    }
}

fn normalize_name(name: &str) -> Result<String, FundValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FundValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}

fn validate_start_year(year: i32, current_year: i32) -> Result<i32, FundValidationError> {
    if (MIN_START_YEAR..=current_year).contains(&year) {
        Ok(year)
    } else {
        Err(FundValidationError::StartYearOutOfRange {
            year,
            min: MIN_START_YEAR,
            max: current_year,
        })
    }
}

fn normalize_aliases(aliases: &[String]) -> Vec<String> {
    aliases
        .iter()
        .map(|alias| alias.trim())
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{FundDraft, FundPatch, FundValidationError};

    #[test]
    fn draft_normalization_trims_and_drops_blank_aliases() {
        let draft = FundDraft::new("  Acme Growth ", 2015).with_aliases([
            " Acme Growth Fund ",
            "   ",
            "AGF",
            "AGF",
        ]);

        let normalized = draft.normalized(2026).unwrap();
        assert_eq!(normalized.name, "Acme Growth");
        assert_eq!(normalized.aliases, vec!["Acme Growth Fund", "AGF", "AGF"]);
    }

    #[test]
    fn draft_rejects_blank_name() {
        let err = FundDraft::new("   ", 2015).normalized(2026).unwrap_err();
        assert_eq!(err, FundValidationError::BlankName);
    }

    #[test]
    fn start_year_bounds_are_inclusive() {
        assert!(FundDraft::new("a", 1900).normalized(2026).is_ok());
        assert!(FundDraft::new("a", 2026).normalized(2026).is_ok());
        assert!(matches!(
            FundDraft::new("a", 1899).normalized(2026),
            Err(FundValidationError::StartYearOutOfRange { year: 1899, .. })
        ));
        assert!(matches!(
            FundDraft::new("a", 2027).normalized(2026),
            Err(FundValidationError::StartYearOutOfRange { max: 2026, .. })
        ));
    }

    #[test]
    fn patch_keeps_empty_alias_list_as_clear_request() {
        let patch = FundPatch {
            aliases: Some(vec!["  ".to_string()]),
            ..FundPatch::default()
        };

        let normalized = patch.normalized(2026).unwrap();
        assert_eq!(normalized.aliases, Some(Vec::new()));
        assert!(!normalized.touches_fund_row());
    }

    #[test]
    fn patch_validates_only_supplied_fields() {
        assert!(FundPatch::default().normalized(2026).is_ok());

        let blank_name = FundPatch {
            name: Some(" ".to_string()),
            ..FundPatch::default()
        };
        assert_eq!(
            blank_name.normalized(2026).unwrap_err(),
            FundValidationError::BlankName
        );
    }
}
