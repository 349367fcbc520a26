//! Outbound adapters implementing the domain ports.
//!
//! Both adapters keep their state in process memory. Production deployments
//! swap them for networked implementations of the same ports.

pub mod cache;
pub mod persistence;
