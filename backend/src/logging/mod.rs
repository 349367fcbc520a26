//! Structured, leveled, multi-sink logging shared by every layer.
//!
//! Purpose: give repositories, services and controllers one logging
//! capability that merges component context, the request correlation id and
//! call-specific fields into a [`LogEntry`], then hands it to the console
//! sink (`tracing`) and an optional secondary sink.
//!
//! Public surface:
//! - [`Logger`] and [`LoggerConfig`]: per-component logger and its settings.
//! - [`LoggerRegistry`]: memoising factory with a single reconfiguration
//!   entry point.
//! - [`LogSink`] implementations: [`ConsoleSink`], [`RecordingSink`],
//!   [`JsonLinesSink`].

mod entry;
mod level;
mod logger;
mod registry;
mod security;
mod sink;

pub use entry::LogEntry;
pub use level::{LogLevel, LogLevelParseError};
pub(crate) use logger::millis;
pub use logger::{Logger, LoggerConfig, TestOutcome};
pub use registry::LoggerRegistry;
pub use security::SecuritySeverity;
pub use sink::{ConsoleSink, JsonLinesSink, LogSink, RecordingSink, SinkError};
