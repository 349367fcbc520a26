//! Service-level cache keyed by caller-chosen strings.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::domain::Error;
use crate::domain::ports::{Cache, CacheKey};
use crate::logging::Logger;

/// Namespaced view over a [`Cache`] dedicated to one service.
///
/// Backend failures and undecodable entries are logged and reported as
/// misses; only malformed keys are errors.
#[derive(Clone)]
pub struct ServiceCache {
    namespace: String,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    logger: Arc<Logger>,
}

impl ServiceCache {
    /// Wrap `cache`, prefixing every key with `namespace`.
    pub fn new(
        namespace: impl Into<String>,
        cache: Arc<dyn Cache>,
        ttl: Duration,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            cache,
            ttl,
            logger,
        }
    }

    /// Lifetime applied by [`ServiceCache::set`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode the live entry for `key`.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidRequest`] for blank or padded keys.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let key = self.key(key)?;
        let value = match self.cache.get(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.warn("service cache read failed", &key, &err);
                return Ok(None);
            }
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(err) => {
                self.warn("discarding undecodable service cache entry", &key, &err);
                if let Err(err) = self.cache.invalidate(&key).await {
                    self.warn("service cache invalidation failed", &key, &err);
                }
                Ok(None)
            }
        }
    }

    /// Store `value` under `key` for the configured TTL.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidRequest`] for blank or padded keys.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        self.set_with_ttl(key, value, self.ttl).await
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidRequest`] for blank or padded keys.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), Error> {
        let key = self.key(key)?;
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.warn("service cache encode failed", &key, &err);
                return Ok(());
            }
        };
        if let Err(err) = self.cache.set(&key, encoded, ttl).await {
            self.warn("service cache write failed", &key, &err);
        }
        Ok(())
    }

    /// Drop the entry for `key`.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidRequest`] for blank or padded keys.
    pub async fn invalidate(&self, key: &str) -> Result<(), Error> {
        let key = self.key(key)?;
        if let Err(err) = self.cache.invalidate(&key).await {
            self.warn("service cache invalidation failed", &key, &err);
        }
        Ok(())
    }

    /// Drop every entry of the underlying cache.
    pub async fn clear(&self) {
        if let Err(err) = self.cache.clear().await {
            self.logger.warn(
                "service cache clear failed",
                json!({ "namespace": self.namespace, "error": err.to_string() }),
            );
        }
    }

    fn key(&self, key: &str) -> Result<CacheKey, Error> {
        if key.trim().is_empty() || key.trim() != key {
            return Err(Error::validation(
                "cache key must be non-empty and carry no surrounding whitespace",
            ));
        }
        CacheKey::new(format!("{}:{key}", self.namespace))
            .map_err(|err| Error::validation(err.to_string()))
    }

    fn warn(&self, message: &str, key: &CacheKey, err: &dyn std::fmt::Display) {
        self.logger.warn(
            message,
            json!({ "key": key.as_str(), "error": err.to_string() }),
        );
    }
}

impl std::fmt::Debug for ServiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCache")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
