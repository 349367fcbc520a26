//! Cache key type shared by cache adapters.
use thiserror::Error;

use crate::domain::{EntityId, Filters};

/// Key under which a cache entry is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a caller-chosen key: non-empty and without surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, CacheKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(CacheKeyValidationError::Empty);
        }
        if raw.trim() != raw {
            return Err(CacheKeyValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    /// Key for a single entity of `collection`.
    pub fn entity(collection: &str, id: &EntityId) -> Self {
        Self(format!("{collection}:id:{id}"))
    }

    /// Key for a query result of `collection`, derived from the canonical
    /// filter set.
    pub fn query(collection: &str, kind: &str, filters: &Filters) -> Self {
        Self(format!("{collection}:{kind}:{}", filters.canonical()))
    }

    /// Key text as stored by adapters.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Validation errors returned when constructing [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyValidationError {
    /// Nothing but whitespace.
    #[error("cache key must not be empty")]
    Empty,
    /// Padded with whitespace.
    #[error("cache key must not contain surrounding whitespace")]
    ContainsWhitespace,
}
