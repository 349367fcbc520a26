//! Test utilities for the backend crate.
//!
//! Shared by unit tests in `src/` and integration tests in `tests/`. Compiled
//! for tests and when the `test-support` feature is enabled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{Persistence, PersistenceError};
use crate::domain::{EntityId, Record, SelectQuery, Selection, TextSearch};
use crate::logging::{LogLevel, LoggerConfig, LoggerRegistry, RecordingSink};

/// Clock whose current instant only moves when a test advances it.
#[derive(Debug)]
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Per-operation call counters recorded by [`CountingPersistence`].
#[derive(Debug, Default)]
pub struct CallCounts {
    pub inserts: AtomicUsize,
    pub selects_by_id: AtomicUsize,
    pub selects_many: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub text_searches: AtomicUsize,
}

impl CallCounts {
    /// Total number of reads that reached the store.
    pub fn reads(&self) -> usize {
        self.selects_by_id.load(Ordering::SeqCst)
            + self.selects_many.load(Ordering::SeqCst)
            + self.text_searches.load(Ordering::SeqCst)
    }
}

/// Persistence wrapper counting the calls forwarded to an inner store.
pub struct CountingPersistence<P> {
    inner: P,
    counts: Arc<CallCounts>,
}

impl<P> CountingPersistence<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            counts: Arc::new(CallCounts::default()),
        }
    }

    pub fn counts(&self) -> Arc<CallCounts> {
        self.counts.clone()
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[async_trait]
impl<P: Persistence> Persistence for CountingPersistence<P> {
    async fn insert(&self, collection: &str, record: Record) -> Result<Record, PersistenceError> {
        bump(&self.counts.inserts);
        self.inner.insert(collection, record).await
    }

    async fn select_by_id(
        &self,
        collection: &str,
        id: &EntityId,
    ) -> Result<Option<Record>, PersistenceError> {
        bump(&self.counts.selects_by_id);
        self.inner.select_by_id(collection, id).await
    }

    async fn select_many(
        &self,
        collection: &str,
        query: &SelectQuery,
    ) -> Result<Selection, PersistenceError> {
        bump(&self.counts.selects_many);
        self.inner.select_many(collection, query).await
    }

    async fn update(
        &self,
        collection: &str,
        record: Record,
        expected_version: u64,
    ) -> Result<Record, PersistenceError> {
        bump(&self.counts.updates);
        self.inner.update(collection, record, expected_version).await
    }

    async fn delete(&self, collection: &str, id: &EntityId) -> Result<(), PersistenceError> {
        bump(&self.counts.deletes);
        self.inner.delete(collection, id).await
    }

    async fn text_search(
        &self,
        collection: &str,
        search: &TextSearch,
    ) -> Result<Vec<Record>, PersistenceError> {
        bump(&self.counts.text_searches);
        self.inner.text_search(collection, search).await
    }
}

/// Isolated registry whose loggers also write to the returned recording sink.
pub fn recording_registry(clock: Arc<dyn Clock>) -> (LoggerRegistry, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let config = LoggerConfig::with_level(LogLevel::Debug).with_external_sink(sink.clone());
    (LoggerRegistry::with_clock(config, clock), sink)
}
