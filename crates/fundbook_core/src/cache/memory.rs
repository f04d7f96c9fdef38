//! Process-local tagged cache.
//!
//! # Invariants
//! - At most `max_entries` entries are held across all tags; storing past the
//!   bound evicts the least recently used entry.
//! - Expired entries are never returned. They are dropped when read, or
//!   evicted like any other entry.

use super::{CacheError, TaggedCache};
use crate::config::{ConfigError, CoreConfig};
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(value) => value,
    None => unreachable!(),
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    tag: String,
    key: String,
}

impl EntryKey {
    fn new(tag: &str, key: &str) -> Self {
        Self {
            tag: tag.to_string(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory LRU cache keyed by `(tag, key)` with per-entry expiry.
pub struct InMemoryTaggedCache {
    entries: Mutex<LruCache<EntryKey, CacheEntry>>,
}

impl InMemoryTaggedCache {
    /// Creates a cache holding up to 1000 entries.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
        }
    }

    /// Creates a cache bounded by `config.cache_max_entries`.
    ///
    /// # Errors
    /// - Returns `ConfigError::Invalid` when the bound is zero.
    pub fn from_config(config: &CoreConfig) -> Result<Self, ConfigError> {
        let max_entries = NonZeroUsize::new(config.cache_max_entries).ok_or_else(|| {
            ConfigError::Invalid("cache_max_entries must be positive".to_string())
        })?;
        Ok(Self::with_max_entries(max_entries))
    }

    /// Number of live entries stored under `tag`.
    pub fn entry_count(&self, tag: &str) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(entry_key, entry)| entry_key.tag == tag && entry.is_live(now))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of entries held across all tags, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<EntryKey, CacheEntry>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl Default for InMemoryTaggedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggedCache for InMemoryTaggedCache {
    fn get(&self, tag: &str, key: &str) -> Result<Option<String>, CacheError> {
        let lookup = EntryKey::new(tag, key);
        let mut entries = self.lock()?;
        let Some(entry) = entries.get(&lookup) else {
            return Ok(None);
        };
        if entry.is_live(Instant::now()) {
            return Ok(Some(entry.value.clone()));
        }

        entries.pop(&lookup);
        Ok(None)
    }

    fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl {ttl:?} out of range")))?;
        let entry_key = EntryKey::new(tag, key);

        let mut entries = self.lock()?;
        if let Some((evicted, _)) = entries.push(entry_key, CacheEntry { value, expires_at }) {
            if evicted.tag != tag || evicted.key != key {
                debug!(
                    "event=cache_evict module=cache status=ok tag={} key={}",
                    evicted.tag, evicted.key
                );
            }
        }
        Ok(())
    }

    fn flush_tag(&self, tag: &str) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        let flushed: Vec<EntryKey> = entries
            .iter()
            .filter(|(entry_key, _)| entry_key.tag == tag)
            .map(|(entry_key, _)| entry_key.clone())
            .collect();
        for entry_key in &flushed {
            entries.pop(entry_key);
        }
        Ok(())
    }
}
