//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold tunables for the fund query cache, pagination and notifications.
//! - Parse JSON configuration supplied by the embedding application.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - `validate()` must pass before a config is used to build services.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
const DEFAULT_PER_PAGE: u32 = 10;
const DEFAULT_MAX_PER_PAGE: u32 = 100;
const DEFAULT_NOTIFICATION_QUEUE_CAPACITY: usize = 64;

/// Configuration failures.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Lifetime of cached fund listings.
    pub cache_ttl_secs: u64,
    /// Cached listings kept before the least recently used one is evicted.
    pub cache_max_entries: usize,
    /// Page size used when a list request does not give one.
    pub default_per_page: u32,
    /// Upper bound applied to requested page sizes.
    pub max_per_page: u32,
    /// Pending duplicate warnings held before new ones are dropped.
    pub notification_queue_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            notification_queue_capacity: DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache_ttl_secs must be positive".to_string(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_entries must be positive".to_string(),
            ));
        }
        if self.default_per_page == 0 || self.max_per_page == 0 {
            return Err(ConfigError::Invalid(
                "default_per_page and max_per_page must be positive".to_string(),
            ));
        }
        if self.default_per_page > self.max_per_page {
            return Err(ConfigError::Invalid(format!(
                "default_per_page {} exceeds max_per_page {}",
                self.default_per_page, self.max_per_page
            )));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
