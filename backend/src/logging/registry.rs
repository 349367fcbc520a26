//! Named logger registry.
//!
//! One registry lazily creates and memoises a [`Logger`] per subsystem name.
//! [`LoggerRegistry::configure_all`] is the single entry point for changing
//! settings after loggers exist. The process-wide instance is reached via
//! [`LoggerRegistry::global`]; tests build their own isolated registries.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use mockable::{Clock, DefaultClock};

use super::{Logger, LoggerConfig};

static GLOBAL: OnceLock<LoggerRegistry> = OnceLock::new();

/// Factory memoising one logger per name.
pub struct LoggerRegistry {
    state: Mutex<RegistryState>,
    clock: Arc<dyn Clock>,
}

struct RegistryState {
    config: LoggerConfig,
    loggers: BTreeMap<String, Arc<Logger>>,
}

impl LoggerRegistry {
    /// Create an isolated registry using the system clock.
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_clock(config, Arc::new(DefaultClock))
    }

    /// Create an isolated registry with an injected clock.
    pub fn with_clock(config: LoggerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                config,
                loggers: BTreeMap::new(),
            }),
            clock,
        }
    }

    /// Process-wide registry, created with default settings on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::new(LoggerConfig::default()))
    }

    /// Logger for `name`, created on first request.
    pub fn get(&self, name: &str) -> Arc<Logger> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let config = state.config.clone();
        let clock = self.clock.clone();
        state
            .loggers
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Logger::new(name, config, clock)))
            .clone()
    }

    /// Push `config` to every logger created so far and to future ones.
    pub fn configure_all(&self, config: LoggerConfig) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for logger in state.loggers.values() {
            logger.configure(config.clone());
        }
        state.config = config;
    }

    /// Names of the loggers created so far, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loggers
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for LoggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerRegistry")
            .field("loggers", &self.names())
            .finish_non_exhaustive()
    }
}
