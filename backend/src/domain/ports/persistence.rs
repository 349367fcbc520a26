//! Port for the backing store behind every repository.
//!
//! The store is addressed per named collection. Repositories are thin
//! orchestrations over this contract plus caching, validation and logging;
//! adapters own everything about how records are actually kept.

use async_trait::async_trait;

use crate::domain::{EntityId, Record, SelectQuery, Selection, TextSearch};

use super::define_port_error;

define_port_error! {
    /// Errors raised by persistence adapters.
    pub enum PersistenceError {
        /// Store connection could not be established.
        Connection { message: String } =>
            "persistence connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "persistence query failed: {message}",
        /// A record with the same id already exists.
        Duplicate { id: String } =>
            "record {id} already exists",
        /// The record to change does not exist.
        Missing { id: String } =>
            "record {id} does not exist",
        /// Optimistic concurrency check failed.
        VersionConflict { expected: u64, actual: u64 } =>
            "version mismatch: expected {expected}, found {actual}",
    }
}

/// Backing store contract.
///
/// # Version semantics
///
/// - `insert` stores the record as given; repositories create version 1.
/// - `update` replaces the stored record only when its current version equals
///   `expected_version`, and otherwise fails with
///   [`PersistenceError::VersionConflict`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store a new record and return it as persisted.
    async fn insert(&self, collection: &str, record: Record) -> Result<Record, PersistenceError>;

    /// Fetch one record.
    async fn select_by_id(
        &self,
        collection: &str,
        id: &EntityId,
    ) -> Result<Option<Record>, PersistenceError>;

    /// Fetch records matching `query`, optionally ordered and windowed.
    async fn select_many(
        &self,
        collection: &str,
        query: &SelectQuery,
    ) -> Result<Selection, PersistenceError>;

    /// Replace a record using an optimistic version check.
    async fn update(
        &self,
        collection: &str,
        record: Record,
        expected_version: u64,
    ) -> Result<Record, PersistenceError>;

    /// Remove a record.
    async fn delete(&self, collection: &str, id: &EntityId) -> Result<(), PersistenceError>;

    /// Free-text match against one field combined with equality filters.
    async fn text_search(
        &self,
        collection: &str,
        search: &TextSearch,
    ) -> Result<Vec<Record>, PersistenceError>;
}
