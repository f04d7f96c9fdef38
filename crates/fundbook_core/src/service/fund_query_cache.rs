//! Read-through cache for fund listings.
//!
//! # Responsibility
//! - Serve paginated fund listings from the tagged cache when possible.
//! - Flush every cached listing when any fund changes.
//!
//! # Invariants
//! - Keys are derived from the normalized query only, so requests with the
//!   same effective filters share one entry.
//! - All listings live under the single `funds` tag.
//! - Cache trouble degrades to a direct store query, never to an error.

use crate::cache::TaggedCache;
use crate::config::CoreConfig;
use crate::model::listing::{FundListQuery, FundPage, NormalizedFundQuery};
use crate::repo::fund_repo::{FundRepository, RepoResult};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Tag shared by every cached fund listing.
pub const FUNDS_CACHE_TAG: &str = "funds";
const CACHE_KEY_PREFIX: &str = "funds_index_";

/// Derives the cache key for one normalized query.
pub fn cache_key(query: &NormalizedFundQuery) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(query)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{CACHE_KEY_PREFIX}{:x}", hasher.finalize()))
}

pub struct FundQueryCache<C: TaggedCache> {
    cache: C,
    ttl: Duration,
    default_per_page: u32,
    max_per_page: u32,
}

impl<C: TaggedCache> FundQueryCache<C> {
    pub fn new(cache: C, config: &CoreConfig) -> Self {
        Self {
            cache,
            ttl: config.cache_ttl(),
            default_per_page: config.default_per_page,
            max_per_page: config.max_per_page,
        }
    }

    pub fn normalize(&self, query: &FundListQuery) -> NormalizedFundQuery {
        query.normalized(self.default_per_page, self.max_per_page)
    }

    /// Returns the listing for `query`, querying `repo` only on a miss.
    pub fn list<R: FundRepository + ?Sized>(
        &self,
        repo: &R,
        query: &FundListQuery,
    ) -> RepoResult<FundPage> {
        let normalized = self.normalize(query);
        match cache_key(&normalized) {
            Ok(key) => self
                .cache
                .remember_under_tag(&key, self.ttl, FUNDS_CACHE_TAG, || {
                    repo.list_funds(&normalized)
                }),
            Err(err) => {
                warn!(
                    "event=fund_list_cache module=service status=error error_code=key_failed error={err}"
                );
                repo.list_funds(&normalized)
            }
        }
    }

    /// Drops every cached listing.
    pub fn invalidate(&self) {
        match self.cache.flush_tag(FUNDS_CACHE_TAG) {
            Ok(()) => debug!("event=fund_cache_flush module=service status=ok tag={FUNDS_CACHE_TAG}"),
            Err(err) => warn!(
                "event=fund_cache_flush module=service status=error tag={FUNDS_CACHE_TAG} error={err}"
            ),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}
