//! Port interface for TTL caches used by repositories and services.
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{CacheKey, define_port_error};

define_port_error! {
    /// Errors surfaced by cache adapters. Callers treat them as misses.
    pub enum CacheError {
        /// Cache backend is unavailable or timing out.
        Backend { message: String } => "cache backend failure: {message}",
        /// Serialisation or deserialisation of cached content failed.
        Serialization { message: String } => "cache serialisation failed: {message}",
    }
}

/// Key/value store whose entries expire after a per-entry TTL.
///
/// An entry whose expiry is not in the future is absent: adapters purge it
/// on the read that observes it. Adapters never evict entries otherwise,
/// except through [`Cache::invalidate`] and [`Cache::clear`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError>;

    /// Store `value` until `ttl` has elapsed, replacing any previous entry.
    async fn set(&self, key: &CacheKey, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Drop the entry for `key`, if any.
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Drop every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}
