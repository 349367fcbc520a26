//! Leveled structured logger with a base context and specialised emitters.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use mockable::Clock;
use serde_json::{Map, Value, json};

use super::{ConsoleSink, LogEntry, LogLevel, LogSink, SecuritySeverity};
use crate::domain::CorrelationId;

/// Settings shared by every logger created from one registry.
#[derive(Clone, Default)]
pub struct LoggerConfig {
    /// Minimum level that is emitted.
    pub level: LogLevel,
    /// Whether entries are also delivered to `external_sink`.
    pub external_sink_enabled: bool,
    /// Secondary destination; failures fall back to the console alone.
    pub external_sink: Option<Arc<dyn LogSink>>,
}

impl LoggerConfig {
    /// Console-only configuration at `level`.
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Enable a secondary sink.
    pub fn with_external_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.external_sink_enabled = true;
        self.external_sink = Some(sink);
        self
    }
}

impl std::fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("level", &self.level)
            .field("external_sink_enabled", &self.external_sink_enabled)
            .field("external_sink", &self.external_sink.is_some())
            .finish()
    }
}

/// Outcome reported through [`Logger::test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// The check passed.
    Passed,
    /// The check failed.
    Failed,
    /// The check did not run.
    Skipped,
}

impl TestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Structured logger bound to one component name.
///
/// Every entry merges the base context (`{"component": name}`), the
/// correlation id in scope, and the call-specific context, in that order.
/// Logging never fails: secondary sink errors are swallowed because the
/// console sink has already received the entry.
pub struct Logger {
    name: String,
    base_context: Map<String, Value>,
    config: RwLock<LoggerConfig>,
    clock: Arc<dyn Clock>,
    console: ConsoleSink,
}

impl Logger {
    /// Create a logger for `name`.
    pub fn new(name: impl Into<String>, config: LoggerConfig, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        let mut base_context = Map::new();
        base_context.insert("component".to_owned(), Value::String(name.clone()));
        Self {
            name,
            base_context,
            config: RwLock::new(config),
            clock,
            console: ConsoleSink,
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Replace the configuration.
    pub fn configure(&self, config: LoggerConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Current threshold.
    pub fn level(&self) -> LogLevel {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .level
    }

    /// Whether entries at `level` are emitted.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Log `message` at `level` with call-specific context.
    pub fn log(&self, level: LogLevel, message: &str, context: Value) {
        if let Some(entry) = self.entry(level, message, context) {
            self.dispatch(&entry);
        }
    }

    /// Log `message` at `level` with an attached error and its source chain.
    pub fn log_error(
        &self,
        level: LogLevel,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        context: Value,
    ) {
        if let Some(entry) = self.entry(level, message, context) {
            self.dispatch(&entry.with_error(error));
        }
    }

    /// Debug-level entry.
    pub fn debug(&self, message: &str, context: Value) {
        self.log(LogLevel::Debug, message, context);
    }

    /// Info-level entry.
    pub fn info(&self, message: &str, context: Value) {
        self.log(LogLevel::Info, message, context);
    }

    /// Warn-level entry.
    pub fn warn(&self, message: &str, context: Value) {
        self.log(LogLevel::Warn, message, context);
    }

    /// Error-level entry.
    pub fn error(&self, message: &str, context: Value) {
        self.log(LogLevel::Error, message, context);
    }

    /// Error-level entry with an attached error.
    pub fn error_with(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        context: Value,
    ) {
        self.log_error(LogLevel::Error, message, error, context);
    }

    /// Timing of a completed operation.
    pub fn performance(&self, operation: &str, duration: Duration, context: Value) {
        let mut context = into_map(context);
        context.insert("operation".to_owned(), json!(operation));
        context.insert("durationMs".to_owned(), json!(millis(duration)));
        self.log(
            LogLevel::Info,
            &format!("performance: {operation}"),
            Value::Object(context),
        );
    }

    /// Security event, logged at a level derived from its severity.
    pub fn security(&self, event: &str, details: Value) -> SecuritySeverity {
        let severity = SecuritySeverity::classify(event);
        let mut context = into_map(details);
        context.insert("securityEvent".to_owned(), json!(event));
        context.insert("severity".to_owned(), json!(severity.as_str()));
        self.log(
            severity.log_level(),
            &format!("security: {event}"),
            Value::Object(context),
        );
        severity
    }

    /// Workflow step progress.
    pub fn workflow(&self, workflow_id: &str, step: &str, status: &str) {
        self.log(
            LogLevel::Info,
            &format!("workflow {workflow_id}: {step} {status}"),
            json!({ "workflowId": workflow_id, "step": step, "status": status }),
        );
    }

    /// Result of a named check.
    pub fn test(&self, name: &str, outcome: TestOutcome) {
        let level = match outcome {
            TestOutcome::Failed => LogLevel::Error,
            TestOutcome::Passed | TestOutcome::Skipped => LogLevel::Info,
        };
        self.log(
            level,
            &format!("test {name}: {}", outcome.as_str()),
            json!({ "test": name, "result": outcome.as_str() }),
        );
    }

    fn entry(&self, level: LogLevel, message: &str, context: Value) -> Option<LogEntry> {
        if !self.enabled(level) {
            return None;
        }
        let mut merged = self.base_context.clone();
        if let Some(id) = CorrelationId::current() {
            merged.insert("correlationId".to_owned(), Value::String(id.to_string()));
        }
        merged.extend(into_map(context));
        Some(LogEntry {
            timestamp: self.clock.utc(),
            level,
            logger: self.name.clone(),
            message: message.to_owned(),
            context: merged,
            error: None,
            stack: Vec::new(),
        })
    }

    fn dispatch(&self, entry: &LogEntry) {
        self.console.emit(entry);
        let external = {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if config.external_sink_enabled {
                config.external_sink.clone()
            } else {
                None
            }
        };
        if let Some(sink) = external {
            // Already on the console; a failing secondary sink is ignored.
            let _ = sink.write(entry);
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

fn into_map(context: Value) -> Map<String, Value> {
    match context {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("context".to_owned(), other);
            map
        }
    }
}

/// Whole milliseconds, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    //! Level filtering, context merging and sink fallback coverage.
    use super::*;
    use crate::logging::{RecordingSink, SinkError};
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};

    struct FailingSink;

    impl LogSink for FailingSink {
        fn write(&self, _entry: &LogEntry) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("offline".into()))
        }
    }

    #[fixture]
    fn sink() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::new())
    }

    fn logger_with(level: LogLevel, sink: &Arc<RecordingSink>) -> Logger {
        let config = LoggerConfig::with_level(level).with_external_sink(sink.clone());
        Logger::new("artifacts", config, Arc::new(DefaultClock))
    }

    #[rstest]
    fn entries_below_threshold_are_dropped(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Warn, &sink);
        logger.debug("noise", Value::Null);
        logger.info("routine", Value::Null);
        logger.warn("odd", Value::Null);
        logger.error("broken", Value::Null);

        let levels: Vec<_> = sink.entries().into_iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error]);
    }

    #[rstest]
    fn call_context_is_merged_over_base_context(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        logger.info("created", json!({ "id": "a1" }));

        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.field("component"), Some(&json!("artifacts")));
        assert_eq!(entry.field("id"), Some(&json!("a1")));
        assert_eq!(entry.logger, "artifacts");
    }

    #[rstest]
    fn scalar_context_is_wrapped(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        logger.info("scalar", json!(7));
        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.field("context"), Some(&json!(7)));
    }

    #[rstest]
    #[tokio::test]
    async fn correlation_id_in_scope_is_attached(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        let id = CorrelationId::from_string("artifacts-1-abc");
        CorrelationId::scope(id, async { logger.info("scoped", Value::Null) }).await;
        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.field("correlationId"), Some(&json!("artifacts-1-abc")));
    }

    #[rstest]
    fn error_source_chain_becomes_stack(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        let inner = std::io::Error::other("disk full");
        let outer = SinkError::Io(inner);
        logger.error_with("write failed", &outer, Value::Null);

        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.error.as_deref(), Some("log sink write failed: disk full"));
        assert_eq!(entry.stack, vec!["disk full".to_owned()]);
    }

    #[rstest]
    fn performance_records_duration(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Info, &sink);
        logger.performance("read", Duration::from_millis(42), json!({ "id": "a" }));
        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.field("durationMs"), Some(&json!(42)));
        assert_eq!(entry.field("operation"), Some(&json!("read")));
    }

    #[rstest]
    fn security_level_follows_severity(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        let severity = logger.security("login failed", json!({ "user": "u1" }));
        assert_eq!(severity, SecuritySeverity::Medium);
        let entry = sink.entries().pop().expect("one entry");
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.field("severity"), Some(&json!("medium")));
    }

    #[rstest]
    fn failed_tests_log_at_error(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Debug, &sink);
        logger.test("cache-idempotence", TestOutcome::Failed);
        logger.test("pagination", TestOutcome::Passed);
        let levels: Vec<_> = sink.entries().into_iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Info]);
    }

    #[rstest]
    fn failing_external_sink_is_silent() {
        let config = LoggerConfig::with_level(LogLevel::Debug).with_external_sink(Arc::new(FailingSink));
        let logger = Logger::new("artifacts", config, Arc::new(DefaultClock));
        logger.error("still fine", json!({ "k": 1 }));
    }

    #[rstest]
    fn disabled_external_sink_receives_nothing(sink: Arc<RecordingSink>) {
        let mut config = LoggerConfig::with_level(LogLevel::Debug).with_external_sink(sink.clone());
        config.external_sink_enabled = false;
        let logger = Logger::new("artifacts", config, Arc::new(DefaultClock));
        logger.info("console only", Value::Null);
        assert!(sink.entries().is_empty());
    }

    #[rstest]
    fn configure_changes_threshold(sink: Arc<RecordingSink>) {
        let logger = logger_with(LogLevel::Error, &sink);
        logger.info("dropped", Value::Null);
        logger.configure(LoggerConfig::with_level(LogLevel::Info).with_external_sink(sink.clone()));
        logger.info("kept", Value::Null);
        assert_eq!(sink.matching("kept").len(), 1);
        assert!(sink.matching("dropped").is_empty());
    }
}
