//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod cache;
mod cache_key;
mod persistence;

#[cfg(test)]
pub use cache::MockCache;
pub use cache::{Cache, CacheError};
pub use cache_key::{CacheKey, CacheKeyValidationError};
#[cfg(test)]
pub use persistence::MockPersistence;
pub use persistence::{Persistence, PersistenceError};
