//! In-memory TTL cache adapter.
//!
//! Entries live in a map owned by one adapter instance; nothing is shared
//! across instances or processes. Expiry is lazy: an entry whose deadline has
//! passed is removed by the read that observes it, and there is no
//! background sweep. Under many distinct keys the map grows without bound
//! until entries are read, invalidated or cleared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::domain::ports::{Cache, CacheError, CacheKey};

/// Cached value with its expiry deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cached payload.
    pub data: Value,
    /// Instant after which the entry is absent.
    pub expiry: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

/// Map-backed [`Cache`] with lazy per-entry expiry.
pub struct InMemoryTtlCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTtlCache {
    /// Create an empty cache reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self, ttl: Duration) -> Result<DateTime<Utc>, CacheError> {
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|err| CacheError::backend(format!("ttl out of range: {err}")))?;
        self.clock
            .utc()
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::backend("ttl overflows the clock"))
    }
}

impl std::fmt::Debug for InMemoryTtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTtlCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Cache for InMemoryTtlCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let now = self.clock.utc();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.data.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let expiry = self.deadline(ttl)?;
        self.lock().insert(
            key.clone(),
            CacheEntry {
                data: value,
                expiry,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }
}
