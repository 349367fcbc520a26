//! In-memory persistence adapter.
//!
//! Records are grouped per collection in ordered maps guarded by a single
//! mutex, so every port call observes a consistent snapshot. Updates apply an
//! optimistic version check before replacing a record.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{Persistence, PersistenceError};
use crate::domain::{EntityId, Record, SelectQuery, Selection, SortOrder, TextSearch};

type Collection = BTreeMap<EntityId, Record>;

/// Map-backed [`Persistence`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    collections: Mutex<HashMap<String, Collection>>,
}

impl InMemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Collection>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sort rows by `order`, or by creation instant then id when none is given.
fn sort_rows(rows: &mut [Record], order: Option<&SortOrder>) {
    match order {
        Some(order) => rows.sort_by(|left, right| order.compare(left, right)),
        None => rows.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        }),
    }
}

fn window(rows: Vec<Record>, offset: u64, limit: u64) -> Vec<Record> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

fn contains_text(record: &Record, field: &str, needle: &str) -> bool {
    record
        .field(field)
        .and_then(|value| value.as_str().map(str::to_lowercase))
        .is_some_and(|haystack| haystack.contains(needle))
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn insert(&self, collection: &str, record: Record) -> Result<Record, PersistenceError> {
        let mut collections = self.lock();
        let rows = collections.entry(collection.to_owned()).or_default();
        if rows.contains_key(&record.id) {
            return Err(PersistenceError::duplicate(record.id.as_str()));
        }
        rows.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn select_by_id(
        &self,
        collection: &str,
        id: &EntityId,
    ) -> Result<Option<Record>, PersistenceError> {
        Ok(self
            .lock()
            .get(collection)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn select_many(
        &self,
        collection: &str,
        query: &SelectQuery,
    ) -> Result<Selection, PersistenceError> {
        let mut rows: Vec<Record> = self
            .lock()
            .get(collection)
            .map(|rows| {
                rows.values()
                    .filter(|record| query.filters.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_rows(&mut rows, query.order.as_ref());

        let total = u64::try_from(rows.len()).unwrap_or(u64::MAX);
        let records = match query.range {
            Some(range) => window(rows, range.offset, range.limit),
            None => rows,
        };
        Ok(Selection {
            records,
            total: Some(total),
        })
    }

    async fn update(
        &self,
        collection: &str,
        record: Record,
        expected_version: u64,
    ) -> Result<Record, PersistenceError> {
        let mut collections = self.lock();
        let current = collections
            .get_mut(collection)
            .and_then(|rows| rows.get_mut(&record.id))
            .ok_or_else(|| PersistenceError::missing(record.id.as_str()))?;
        if current.version != expected_version {
            return Err(PersistenceError::version_conflict(
                expected_version,
                current.version,
            ));
        }
        *current = record.clone();
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &EntityId) -> Result<(), PersistenceError> {
        self.lock()
            .get_mut(collection)
            .and_then(|rows| rows.remove(id))
            .map(|_| ())
            .ok_or_else(|| PersistenceError::missing(id.as_str()))
    }

    async fn text_search(
        &self,
        collection: &str,
        search: &TextSearch,
    ) -> Result<Vec<Record>, PersistenceError> {
        let needle = search.query.to_lowercase();
        let mut rows: Vec<Record> = self
            .lock()
            .get(collection)
            .map(|rows| {
                rows.values()
                    .filter(|record| search.filters.matches(record))
                    .filter(|record| contains_text(record, &search.field, &needle))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_rows(&mut rows, None);
        Ok(rows)
    }
}
