//! Framework settings loaded via OrthoConfig.
//!
//! Every value is optional; accessors fall back to documented defaults so an
//! empty environment yields a working console-only setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::repository::{DEFAULT_CACHE_TTL, DEFAULT_MAX_PAGE_SIZE};
use crate::logging::{JsonLinesSink, LogLevel, LogLevelParseError, LoggerConfig, SinkError};

/// Settings shared by the logger registry, repositories and services.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "DASHBOARD")]
pub struct FrameworkSettings {
    /// Minimum log level (`debug`, `info`, `warn`, `error`).
    pub log_level: Option<String>,
    /// Mirror log entries to the external JSON lines sink.
    #[ortho_config(default = false)]
    pub external_log_sink: bool,
    /// File receiving external log entries.
    pub log_sink_path: Option<PathBuf>,
    /// Lifetime of cached reads in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Largest accepted page size.
    pub max_page_size: Option<u64>,
}

/// Errors raised while turning settings into runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The log level is not recognised.
    #[error(transparent)]
    LogLevel(#[from] LogLevelParseError),
    /// The external sink is enabled without a path.
    #[error("external log sink enabled but DASHBOARD_LOG_SINK_PATH is unset")]
    MissingSinkPath,
    /// The external sink could not be opened.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl FrameworkSettings {
    /// Configured log level, defaulting to `info`.
    pub fn log_level(&self) -> Result<LogLevel, LogLevelParseError> {
        self.log_level
            .as_deref()
            .map_or(Ok(LogLevel::default()), str::parse)
    }

    /// Configured cache lifetime, defaulting to five minutes.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map_or(DEFAULT_CACHE_TTL, Duration::from_secs)
    }

    /// Configured page size bound, defaulting to 100.
    pub fn max_page_size(&self) -> u64 {
        self.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE)
    }

    /// Logger configuration described by these settings.
    pub fn logger_config(&self) -> Result<LoggerConfig, SettingsError> {
        let config = LoggerConfig::with_level(self.log_level()?);
        if !self.external_log_sink {
            return Ok(config);
        }
        let path = self
            .log_sink_path
            .as_deref()
            .ok_or(SettingsError::MissingSinkPath)?;
        Ok(config.with_external_sink(Arc::new(JsonLinesSink::open(path)?)))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for framework settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 5] = [
        "DASHBOARD_LOG_LEVEL",
        "DASHBOARD_EXTERNAL_LOG_SINK",
        "DASHBOARD_LOG_SINK_PATH",
        "DASHBOARD_CACHE_TTL_SECS",
        "DASHBOARD_MAX_PAGE_SIZE",
    ];

    fn load_from_empty_args() -> FrameworkSettings {
        FrameworkSettings::load_from_iter([OsString::from("dashboard")])
            .expect("config should load")
    }

    fn env_with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.log_level().expect("level"), LogLevel::Info);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.max_page_size(), 100);
        let config = settings.logger_config().expect("console only");
        assert!(!config.external_sink_enabled);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("DASHBOARD_LOG_LEVEL", "warn"),
            ("DASHBOARD_CACHE_TTL_SECS", "30"),
            ("DASHBOARD_MAX_PAGE_SIZE", "25"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.log_level().expect("level"), LogLevel::Warn);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(30));
        assert_eq!(settings.max_page_size(), 25);
    }

    #[rstest]
    fn external_sink_requires_a_path() {
        let _guard = lock_env(env_with(&[("DASHBOARD_EXTERNAL_LOG_SINK", "true")]));

        let settings = load_from_empty_args();
        assert!(settings.external_log_sink);
        assert!(matches!(
            settings.logger_config(),
            Err(SettingsError::MissingSinkPath)
        ));
    }

    #[rstest]
    fn unknown_levels_are_reported() {
        let _guard = lock_env(env_with(&[("DASHBOARD_LOG_LEVEL", "loud")]));

        let settings = load_from_empty_args();
        assert!(settings.log_level().is_err());
    }
}
