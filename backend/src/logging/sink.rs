//! Log sinks.
//!
//! The console sink forwards entries to `tracing` and cannot fail. Secondary
//! sinks may fail; the logger swallows their errors so logging never
//! propagates a failure to the caller.

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;

use super::{LogEntry, LogLevel};

/// Failure reported by a secondary sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be written to.
    #[error("log sink write failed: {0}")]
    Io(#[from] std::io::Error),
    /// The entry could not be encoded.
    #[error("log entry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The sink refused the entry.
    #[error("log sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for structured log entries.
pub trait LogSink: Send + Sync {
    /// Deliver one entry.
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;
}

/// Always-on sink emitting entries as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// Emit `entry` at its own level.
    pub fn emit(&self, entry: &LogEntry) {
        let context = Value::Object(entry.context.clone());
        let error = entry.error.as_deref().unwrap_or_default();
        match entry.level {
            LogLevel::Debug => tracing::debug!(
                logger = %entry.logger,
                context = %context,
                error,
                "{}",
                entry.message
            ),
            LogLevel::Info => tracing::info!(
                logger = %entry.logger,
                context = %context,
                error,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                logger = %entry.logger,
                context = %context,
                error,
                "{}",
                entry.message
            ),
            LogLevel::Error => tracing::error!(
                logger = %entry.logger,
                context = %context,
                error,
                stack = ?entry.stack,
                "{}",
                entry.message
            ),
        }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.emit(entry);
        Ok(())
    }
}

/// Sink keeping every entry in memory.
///
/// Useful as an audit buffer and for asserting on log output in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded entries whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.message.contains(needle))
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

/// Sink appending one JSON document per line to a writer.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    /// Wrap an arbitrary writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Append to the file at `path`, creating it when missing.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(file))
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl LogSink for JsonLinesSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
