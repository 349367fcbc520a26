//! Request-scoped correlation identifier shared by logs, errors and envelopes.
//!
//! A `CorrelationId` follows one request through the controller, service and
//! repository layers. It lives in task-local storage so lower layers can pick
//! it up without explicit parameter threading.
//!
//! Tokio task-local variables are not inherited across spawned tasks. Use
//! [`CorrelationId::scope`] when spawning new tasks so the active identifier
//! propagates.

use std::future::Future;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::task_local;

task_local! {
    /// Task-local storage for the current correlation identifier.
    pub(crate) static CORRELATION_ID: CorrelationId;
}

const SUFFIX_LEN: usize = 9;

/// Per-request correlation identifier of the form
/// `<controller>-<unix millis>-<random suffix>`.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use dashboard_backend::domain::CorrelationId;
///
/// let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
/// let id = CorrelationId::generate("artifacts", at);
/// assert!(id.as_str().starts_with("artifacts-1700000000000-"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new identifier for the named controller.
    #[must_use]
    pub fn generate(controller: &str, at: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        Self(format!("{controller}-{}-{suffix}", at.timestamp_millis()))
    }

    /// Wrap an identifier received from elsewhere, e.g. an inbound header.
    #[must_use]
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the current correlation identifier if one is in scope.
    #[must_use]
    pub fn current() -> Option<Self> {
        CORRELATION_ID.try_with(Clone::clone).ok()
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Execute the provided future with the supplied identifier in scope.
    pub async fn scope<Fut>(id: CorrelationId, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        CORRELATION_ID.scope(id, fut).await
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    //! Scope propagation and id shape.
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn generate_embeds_controller_and_timestamp() {
        let id = CorrelationId::generate("users", at());
        let mut parts = id.as_str().splitn(3, '-');
        assert_eq!(parts.next(), Some("users"));
        assert_eq!(parts.next(), Some("1700000000123"));
        let suffix = parts.next().expect("suffix present");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generate_varies_suffix() {
        let first = CorrelationId::generate("users", at());
        let second = CorrelationId::generate("users", at());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn current_reflects_scope() {
        let expected = CorrelationId::from_string("users-1-abc");
        let observed = CorrelationId::scope(expected.clone(), async { CorrelationId::current() }).await;
        assert_eq!(observed, Some(expected));
    }

    #[tokio::test]
    async fn current_is_none_out_of_scope() {
        assert!(CorrelationId::current().is_none());
    }
}
