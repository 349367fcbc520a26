//! Generic repository over one named collection.
//!
//! A [`Repository`] layers validation, caching, per-id write serialisation
//! and structured logging on top of the [`Persistence`] port. It never turns
//! errors into responses; it logs them with context and returns them.
//!
//! Caching rules:
//! - single records are cached under their id once found;
//! - `find`, `count` and paginated results are cached under the canonical
//!   filter set, pages also keyed by page number and size;
//! - searches always reach the store;
//! - every successful write drops the record entry and all query entries of
//!   this instance. Other instances sharing the store keep their own caches
//!   until their TTL lapses.

mod locks;
mod transaction;


use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use mockable::Clock;
use pagination::{PageRequest, PageRequestError, Paginated};
use serde_json::{Map, Value, json};

use self::locks::KeyedLocks;
pub use self::transaction::{
    BatchFailure, BatchOutcome, Operation, Transaction, TransactionStatus, operation,
};
use crate::domain::entity::{entity_fields, reject_reserved};
use crate::domain::ports::{Cache, CacheKey, Persistence, PersistenceError};
use crate::domain::{
    Entity, EntityId, Error, Filters, Patch, Range, Record, SelectQuery, SortOrder, Stored,
    TextSearch,
};
use crate::logging::Logger;

/// Default lifetime of cached repository reads.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default upper bound for `find_with_pagination` limits.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Static settings of one repository instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    /// Collection name passed to the store.
    pub collection: String,
    /// Field matched by [`Repository::search`].
    pub search_field: String,
    /// Lifetime of cached reads.
    pub cache_ttl: Duration,
    /// Ordering applied to `find` and paginated reads.
    pub default_order: Option<SortOrder>,
    /// Largest accepted page size.
    pub max_page_size: u64,
}

impl RepositoryConfig {
    /// Settings for `collection` with default TTL and page bound.
    pub fn new(collection: impl Into<String>, search_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            search_field: search_field.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            default_order: None,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Override the cache lifetime.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Order query results by `order` instead of creation time.
    #[must_use]
    pub fn with_default_order(mut self, order: SortOrder) -> Self {
        self.default_order = Some(order);
        self
    }

    /// Override the page size bound.
    #[must_use]
    pub fn with_max_page_size(mut self, max: u64) -> Self {
        self.max_page_size = max;
        self
    }
}

/// Persistence-agnostic CRUD, query and transaction surface for entity `E`.
pub struct Repository<E, P> {
    config: RepositoryConfig,
    store: Arc<P>,
    cache: Arc<dyn Cache>,
    logger: Arc<Logger>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    query_keys: Mutex<HashSet<CacheKey>>,
    write_generation: AtomicU64,
    entity_generation: AtomicU64,
    _entity: PhantomData<fn() -> E>,
}

impl<E, P> Repository<E, P> {
    /// Create a repository from its collaborators.
    pub fn new(
        config: RepositoryConfig,
        store: Arc<P>,
        cache: Arc<dyn Cache>,
        logger: Arc<Logger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            logger,
            clock,
            locks: KeyedLocks::default(),
            query_keys: Mutex::new(HashSet::new()),
            write_generation: AtomicU64::new(0),
            entity_generation: AtomicU64::new(0),
            _entity: PhantomData,
        }
    }

    /// Static settings.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        self.config.collection.as_str()
    }
}

impl<E, P> Repository<E, P>
where
    E: Entity,
    P: Persistence,
{
    /// Validate and persist a new entity under a generated id.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidRequest`] when the payload is not
    /// an object, carries server-owned fields or fails [`Entity::validate`].
    pub async fn create(&self, data: E) -> Result<Stored<E>, Error> {
        let id = EntityId::generate(self.clock.utc());
        self.create_with_id(id, data).await
    }

    /// Validate and persist a new entity under a caller-chosen id.
    ///
    /// # Errors
    /// As [`Repository::create`], plus
    /// [`crate::domain::ErrorCode::Conflict`] when the id is taken.
    pub async fn create_with_id(&self, id: EntityId, data: E) -> Result<Stored<E>, Error> {
        let context = json!({ "collection": self.collection(), "id": id.as_str() });
        self.observe("create", context, async {
            data.validate()?;
            let fields = entity_fields(&data)?;
            let now = self.clock.utc();
            let record = Record {
                id,
                created_at: now,
                updated_at: now,
                version: 1,
                fields,
            };
            let stored = self
                .store
                .insert(self.collection(), record)
                .await
                .map_err(|err| self.map_store_error(err))?;
            self.invalidate_queries().await;
            stored.into_stored()
        })
        .await
    }

    /// Fetch one entity, consulting the cache first.
    ///
    /// Only found records are cached.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidId`] for blank ids.
    pub async fn read(&self, id: &str) -> Result<Option<Stored<E>>, Error> {
        let context = json!({ "collection": self.collection(), "id": id });
        self.observe("read", context, async {
            let id = EntityId::parse(id)?;
            let key = CacheKey::entity(self.collection(), &id);
            if let Some(record) = self.cached::<Record>(&key).await {
                return record.into_stored().map(Some);
            }
            let generation = self.entity_generation.load(Ordering::SeqCst);
            let Some(record) = self.fetch(&id).await? else {
                return Ok(None);
            };
            self.remember_entity(&key, &record, generation).await;
            record.into_stored().map(Some)
        })
        .await
    }

    /// Merge `patch` into an existing entity.
    ///
    /// The merged entity is re-validated, including
    /// [`Entity::validate_update`] against the stored value. Concurrent
    /// updates of the same id through this instance run one at a time.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::NotFound`] when the entity does not exist,
    /// [`crate::domain::ErrorCode::InvalidRequest`] when the patch touches
    /// server-owned fields or the result is invalid, and
    /// [`crate::domain::ErrorCode::Conflict`] when another writer updated the
    /// record first.
    pub async fn update(&self, id: &str, patch: Patch) -> Result<Stored<E>, Error> {
        self.update_checked(id, patch, None).await
    }

    /// Like [`Repository::update`], but only when the stored version equals
    /// `expected_version`.
    ///
    /// # Errors
    /// As [`Repository::update`]; a version mismatch is a
    /// [`crate::domain::ErrorCode::Conflict`].
    pub async fn update_if_version(
        &self,
        id: &str,
        patch: Patch,
        expected_version: u64,
    ) -> Result<Stored<E>, Error> {
        self.update_checked(id, patch, Some(expected_version)).await
    }

    async fn update_checked(
        &self,
        id: &str,
        patch: Patch,
        expected_version: Option<u64>,
    ) -> Result<Stored<E>, Error> {
        let context = json!({
            "collection": self.collection(),
            "id": id,
            "fields": patch.keys().cloned().collect::<Vec<_>>(),
        });
        self.observe("update", context, async {
            let id = EntityId::parse(id)?;
            reject_reserved(&patch)?;
            let _guard = self.locks.acquire(&id).await;

            let current = self.existing(&id).await?;
            if let Some(expected) = expected_version.filter(|v| *v != current.version) {
                return Err(version_conflict(&id, expected, current.version));
            }

            let previous: E = decode_fields(&current)?;
            let assigned: Vec<String> = patch
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(field, _)| field.clone())
                .collect();
            let mut merged = current.fields.clone();
            merged.extend(patch);
            let next: E = serde_json::from_value(Value::Object(merged))
                .map_err(|err| Error::validation(format!("invalid update: {err}")))?;
            next.validate()?;
            next.validate_update(&previous)?;
            let fields = entity_fields(&next)?;
            reject_unknown(&fields, &assigned)?;

            let record = Record {
                id: id.clone(),
                created_at: current.created_at,
                updated_at: self.clock.utc().max(current.updated_at),
                version: current.version + 1,
                fields,
            };
            let result = self
                .store
                .update(self.collection(), record, current.version)
                .await;
            self.invalidate_entity(&id).await;
            let stored = result.map_err(|err| self.map_store_error(err))?;
            self.invalidate_queries().await;
            stored.into_stored()
        })
        .await
    }

    /// Remove an entity.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::NotFound`] when the entity does not exist,
    /// including a second delete of the same id.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let context = json!({ "collection": self.collection(), "id": id });
        self.observe("delete", context, async {
            let id = EntityId::parse(id)?;
            let _guard = self.locks.acquire(&id).await;
            self.existing(&id).await?;
            let result = self.store.delete(self.collection(), &id).await;
            self.invalidate_entity(&id).await;
            result.map_err(|err| self.map_store_error(err))?;
            self.invalidate_queries().await;
            Ok(())
        })
        .await
    }

    /// Every entity matching `filters`.
    pub async fn find(&self, filters: &Filters) -> Result<Vec<Stored<E>>, Error> {
        let context = json!({ "collection": self.collection(), "filters": filters });
        self.observe("find", context, async {
            let key = CacheKey::query(self.collection(), "find", filters);
            if let Some(records) = self.cached::<Vec<Record>>(&key).await {
                return decode_all(records);
            }
            let generation = self.write_generation.load(Ordering::SeqCst);
            let selection = self
                .select(SelectQuery {
                    filters: filters.clone(),
                    order: self.config.default_order.clone(),
                    range: None,
                })
                .await?;
            self.remember_query(&key, &selection.records, generation)
                .await;
            decode_all(selection.records)
        })
        .await
    }

    /// One page of entities matching `filters`.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidParameters`] when `page` or `limit`
    /// is zero or `limit` exceeds the configured maximum.
    pub async fn find_with_pagination(
        &self,
        filters: &Filters,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Stored<E>>, Error> {
        let context = json!({
            "collection": self.collection(),
            "filters": filters,
            "page": page,
            "limit": limit,
        });
        self.observe("find_with_pagination", context, async {
            let request = PageRequest::bounded(page, limit, self.config.max_page_size)
                .map_err(invalid_page)?;
            let kind = format!("page:{}:{}", request.page(), request.limit());
            let key = CacheKey::query(self.collection(), &kind, filters);
            if let Some((records, total)) = self.cached::<(Vec<Record>, u64)>(&key).await {
                return Paginated::new(records, &request, total).try_map(Record::into_stored);
            }
            let generation = self.write_generation.load(Ordering::SeqCst);
            let selection = self
                .select(SelectQuery {
                    filters: filters.clone(),
                    order: self.config.default_order.clone(),
                    range: Some(Range {
                        offset: request.offset(),
                        limit: request.limit(),
                    }),
                })
                .await?;
            let total = match selection.total {
                Some(total) => total,
                None => self.count_uncached(filters).await?,
            };
            self.remember_query(&key, &(&selection.records, total), generation)
                .await;
            Paginated::new(selection.records, &request, total).try_map(Record::into_stored)
        })
        .await
    }

    /// Number of entities matching `filters`.
    pub async fn count(&self, filters: &Filters) -> Result<u64, Error> {
        let context = json!({ "collection": self.collection(), "filters": filters });
        self.observe("count", context, async {
            let key = CacheKey::query(self.collection(), "count", filters);
            if let Some(total) = self.cached::<u64>(&key).await {
                return Ok(total);
            }
            let generation = self.write_generation.load(Ordering::SeqCst);
            let total = self.count_uncached(filters).await?;
            self.remember_query(&key, &total, generation).await;
            Ok(total)
        })
        .await
    }

    /// Entities whose search field contains `query`, case-insensitively,
    /// and which match `filters`.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidParameters`] for a blank query.
    pub async fn search(&self, query: &str, filters: &Filters) -> Result<Vec<Stored<E>>, Error> {
        let context = json!({
            "collection": self.collection(),
            "query": query,
            "filters": filters,
        });
        self.observe("search", context, async {
            let query = query.trim();
            if query.is_empty() {
                return Err(Error::invalid_parameters("search query must not be blank"));
            }
            let search = TextSearch {
                field: self.config.search_field.clone(),
                query: query.to_owned(),
                filters: filters.clone(),
            };
            let records = self
                .store
                .text_search(self.collection(), &search)
                .await
                .map_err(|err| self.map_store_error(err))?;
            decode_all(records)
        })
        .await
    }

    async fn fetch(&self, id: &EntityId) -> Result<Option<Record>, Error> {
        self.store
            .select_by_id(self.collection(), id)
            .await
            .map_err(|err| self.map_store_error(err))
    }

    /// Current stored record, bypassing the cache so the version is fresh.
    async fn existing(&self, id: &EntityId) -> Result<Record, Error> {
        self.fetch(id).await?.ok_or_else(|| {
            Error::not_found(format!("{} {id} not found", self.collection()))
                .with_details(json!({ "collection": self.collection(), "id": id.as_str() }))
        })
    }

    async fn select(&self, query: SelectQuery) -> Result<crate::domain::Selection, Error> {
        self.store
            .select_many(self.collection(), &query)
            .await
            .map_err(|err| self.map_store_error(err))
    }

    async fn count_uncached(&self, filters: &Filters) -> Result<u64, Error> {
        let selection = self
            .select(SelectQuery {
                filters: filters.clone(),
                order: None,
                range: None,
            })
            .await?;
        Ok(selection
            .total
            .unwrap_or_else(|| u64::try_from(selection.records.len()).unwrap_or(u64::MAX)))
    }
}

impl<E, P> Repository<E, P> {
    async fn observe<T, F>(&self, operation: &str, context: Value, work: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let started = Instant::now();
        self.logger
            .debug(&format!("{operation} started"), context.clone());
        let result = work.await;
        match &result {
            Ok(_) => self.logger.performance(operation, started.elapsed(), context),
            Err(err) => {
                let mut context = context;
                if let Value::Object(map) = &mut context {
                    map.insert("code".to_owned(), json!(err.code()));
                }
                self.logger
                    .error_with(&format!("{operation} failed"), err, context);
            }
        }
        result
    }

    fn map_store_error(&self, err: PersistenceError) -> Error {
        let collection = self.collection();
        let kind = err.kind();
        let (error, mut details) = match err {
            PersistenceError::Connection { message } => (
                Error::service_unavailable(format!("{collection} store unavailable: {message}")),
                json!({}),
            ),
            PersistenceError::Query { message } => (
                Error::internal(format!("{collection} store error: {message}")),
                json!({}),
            ),
            PersistenceError::Duplicate { id } => (
                Error::conflict(format!("{collection} {id} already exists")),
                json!({ "id": id }),
            ),
            PersistenceError::Missing { id } => (
                Error::not_found(format!("{collection} {id} not found")),
                json!({ "id": id }),
            ),
            PersistenceError::VersionConflict { expected, actual } => (
                Error::conflict(format!(
                    "{collection} changed concurrently: expected version {expected}, found {actual}"
                )),
                json!({ "expectedVersion": expected, "actualVersion": actual }),
            ),
        };
        if let Value::Object(fields) = &mut details {
            fields.insert("collection".to_owned(), json!(collection));
            fields.insert("storeError".to_owned(), json!(kind));
        }
        error.with_details(details)
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = match self.cache.get(key).await {
            Ok(value) => value?,
            Err(err) => {
                self.logger
                    .warn("cache read failed", json!({ "key": key.as_str(), "error": err.to_string() }));
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                self.logger.warn(
                    "discarding undecodable cache entry",
                    json!({ "key": key.as_str(), "error": err.to_string() }),
                );
                self.drop_key(key).await;
                None
            }
        }
    }

    async fn remember<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.logger
                    .warn("cache encode failed", json!({ "key": key.as_str(), "error": err.to_string() }));
                return;
            }
        };
        if let Err(err) = self.cache.set(key, encoded, self.config.cache_ttl).await {
            self.logger
                .warn("cache write failed", json!({ "key": key.as_str(), "error": err.to_string() }));
        }
    }

    /// Cache a fetched record unless an update or delete of this instance
    /// landed after `generation` was read, checking again after the write.
    async fn remember_entity(&self, key: &CacheKey, record: &Record, generation: u64) {
        if self.entity_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.remember(key, record).await;
        if self.entity_generation.load(Ordering::SeqCst) != generation {
            self.drop_key(key).await;
        }
    }

    /// Cache a query result unless a write landed while it was computed.
    async fn remember_query<T: serde::Serialize>(&self, key: &CacheKey, value: &T, generation: u64) {
        if self.write_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.remember(key, value).await;
        self.query_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if self.write_generation.load(Ordering::SeqCst) != generation {
            self.drop_key(key).await;
        }
    }

    async fn drop_key(&self, key: &CacheKey) {
        if let Err(err) = self.cache.invalidate(key).await {
            self.logger
                .warn("cache invalidation failed", json!({ "key": key.as_str(), "error": err.to_string() }));
        }
    }

    async fn invalidate_entity(&self, id: &EntityId) {
        self.entity_generation.fetch_add(1, Ordering::SeqCst);
        self.drop_key(&CacheKey::entity(self.collection(), id)).await;
    }

    async fn invalidate_queries(&self) {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<CacheKey> = self
            .query_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for key in &keys {
            self.drop_key(key).await;
        }
    }
}

impl<E, P> std::fmt::Debug for Repository<E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn decode_fields<E: Entity>(record: &Record) -> Result<E, Error> {
    serde_json::from_value(Value::Object(record.fields.clone())).map_err(|err| {
        Error::internal(format!(
            "stored record {} does not match the entity shape: {err}",
            record.id
        ))
    })
}

fn decode_all<E: Entity>(records: Vec<Record>) -> Result<Vec<Stored<E>>, Error> {
    records.into_iter().map(Record::into_stored).collect()
}

/// Reject patches whose non-null fields the entity does not keep.
fn reject_unknown(fields: &Map<String, Value>, assigned: &[String]) -> Result<(), Error> {
    let unknown: Vec<&str> = assigned
        .iter()
        .map(String::as_str)
        .filter(|field| !fields.contains_key(*field))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(
        Error::validation(format!("unknown fields {}", unknown.join(", ")))
            .with_details(json!({ "unknownFields": unknown })),
    )
}

fn invalid_page(err: PageRequestError) -> Error {
    Error::invalid_parameters(err.to_string())
}

fn version_conflict(id: &EntityId, expected: u64, actual: u64) -> Error {
    Error::conflict(format!(
        "{id} is at version {actual}, expected {expected}"
    ))
    .with_details(json!({ "id": id.as_str(), "expectedVersion": expected, "actualVersion": actual }))
}
