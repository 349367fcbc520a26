//! Domain layer: entities, errors, ports and the repository/service pipeline.
//!
//! Purpose: hold everything that is independent of transport and storage.
//! Adapters live in `outbound`, request handling in `inbound`.
//!
//! Public surface:
//! - [`Error`] and [`ErrorCode`]: transport-agnostic failure payload.
//! - [`Entity`], [`EntityId`], [`Record`], [`Stored`]: entity shapes.
//! - [`Filters`], [`SelectQuery`] and friends: query shapes for the store.
//! - [`CorrelationId`]: request-scoped identifier carried by logs and errors.
//! - [`repository`], [`service`]: the generic layers.
//! - [`artifacts`]: the example domain.

pub mod artifacts;
mod correlation_id;
mod entity;
pub mod error;
pub mod ports;
mod query;
pub mod repository;
pub mod service;

pub use self::correlation_id::CorrelationId;
pub use self::entity::{Entity, EntityId, Patch, RESERVED_FIELDS, Record, Stored};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::query::{
    Filters, Range, SelectQuery, Selection, SortDirection, SortOrder, TextSearch, compare_values,
};
pub use self::repository::{
    BatchFailure, BatchOutcome, Operation, Repository, RepositoryConfig, Transaction,
    TransactionStatus, operation,
};
pub use self::service::{Service, ServiceRunner};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use dashboard_backend::domain::{DomainResult, Error};
///
/// fn lookup() -> DomainResult<u32> {
///     Err(Error::not_found("nothing here"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
