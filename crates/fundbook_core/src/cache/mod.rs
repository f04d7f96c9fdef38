//! Tagged cache store contracts.
//!
//! # Responsibility
//! - Define the key/value cache consumed by the fund query cache.
//! - Provide read-through `remember_under_tag` on top of `get`/`put`.
//!
//! # Invariants
//! - Values are stored as JSON text; a value that fails to decode is treated
//!   as a miss.
//! - `remember_under_tag` never fails because of the cache itself: backend and
//!   codec errors are logged and the producer result is returned.

mod memory;

pub use memory::InMemoryTaggedCache;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Cache backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A writer panicked while holding the cache lock.
    Poisoned,
    Backend(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poisoned => write!(f, "cache lock poisoned"),
            Self::Backend(message) => write!(f, "cache backend error: {message}"),
        }
    }
}

impl Error for CacheError {}

/// Key/value cache whose entries are grouped under tags.
pub trait TaggedCache {
    /// Returns the live value stored under `key` in `tag`.
    fn get(&self, tag: &str, key: &str) -> Result<Option<String>, CacheError>;
    /// Stores `value` under `key` in `tag` for `ttl`.
    fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    /// Drops every entry stored under `tag`.
    fn flush_tag(&self, tag: &str) -> Result<(), CacheError>;

    /// Returns the cached value for `key`, or runs `producer` and caches its
    /// successful result. Producer errors are returned and nothing is cached.
    fn remember_under_tag<T, E, F>(
        &self,
        key: &str,
        ttl: Duration,
        tag: &str,
        producer: F,
    ) -> Result<T, E>
    where
        Self: Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        match self.get(tag, key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("event=cache_read module=cache status=hit tag={tag} key={key}");
                    return Ok(value);
                }
                Err(err) => warn!(
                    "event=cache_read module=cache status=error tag={tag} key={key} error_code=decode_failed error={err}"
                ),
            },
            Ok(None) => debug!("event=cache_read module=cache status=miss tag={tag} key={key}"),
            Err(err) => warn!(
                "event=cache_read module=cache status=error tag={tag} key={key} error_code=backend_failed error={err}"
            ),
        }

        let value = producer()?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(err) = self.put(tag, key, raw, ttl) {
                    warn!(
                        "event=cache_write module=cache status=error tag={tag} key={key} error_code=backend_failed error={err}"
                    );
                }
            }
            Err(err) => warn!(
                "event=cache_write module=cache status=error tag={tag} key={key} error_code=encode_failed error={err}"
            ),
        }
        Ok(value)
    }
}

impl<C: TaggedCache> TaggedCache for Arc<C> {
    fn get(&self, tag: &str, key: &str) -> Result<Option<String>, CacheError> {
        self.as_ref().get(tag, key)
    }

    fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.as_ref().put(tag, key, value, ttl)
    }

    fn flush_tag(&self, tag: &str) -> Result<(), CacheError> {
        self.as_ref().flush_tag(tag)
    }
}
