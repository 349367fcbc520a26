//! Layered request/data framework.
//!
//! Controllers run requests through a fixed five-stage pipeline, services
//! apply business rules and optional workflows, and repositories provide
//! cached, validated access to a pluggable store. A structured logger is
//! shared by every layer.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod logging;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::FrameworkSettings;
