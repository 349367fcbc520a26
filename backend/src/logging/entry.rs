//! Structured log entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::LogLevel;

/// One structured log line as handed to sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Wall-clock instant the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Name of the emitting logger.
    pub logger: String,
    /// Human-readable message.
    pub message: String,
    /// Base context merged with call-specific context.
    pub context: Map<String, Value>,
    /// Display form of the attached error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Display forms of the error's source chain, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

impl LogEntry {
    /// Read a context field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }

    /// Attach an error and walk its source chain.
    pub(crate) fn with_error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        self.error = Some(error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            self.stack.push(cause.to_string());
            source = cause.source();
        }
        self
    }
}
