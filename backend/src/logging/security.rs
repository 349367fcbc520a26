//! Keyword-based severity for security events.

use serde::Serialize;

use super::LogLevel;

const CRITICAL_KEYWORDS: &[&str] = &[
    "breach",
    "injection",
    "exploit",
    "compromise",
    "privilege escalation",
    "data leak",
];
const HIGH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "brute force",
    "tamper",
    "suspicious",
    "token reuse",
];
const MEDIUM_KEYWORDS: &[&str] = &[
    "failed",
    "invalid",
    "denied",
    "locked",
    "expired",
    "rate limit",
];
const LOW_KEYWORDS: &[&str] = &["login", "logout", "session", "password change", "access"];

/// Severity assigned to a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    /// Routine or unrecognised events.
    Low,
    /// Events worth reviewing.
    Medium,
    /// Likely attacks.
    High,
    /// Confirmed or imminent compromise.
    Critical,
}

impl SecuritySeverity {
    /// Classify an event by testing it against the keyword lists from most to
    /// least severe; unmatched events are [`SecuritySeverity::Low`].
    ///
    /// # Examples
    /// ```
    /// use dashboard_backend::logging::SecuritySeverity;
    ///
    /// assert_eq!(SecuritySeverity::classify("SQL injection attempt"), SecuritySeverity::Critical);
    /// assert_eq!(SecuritySeverity::classify("login failed"), SecuritySeverity::Medium);
    /// assert_eq!(SecuritySeverity::classify("profile viewed"), SecuritySeverity::Low);
    /// ```
    pub fn classify(event: &str) -> Self {
        let event = event.to_lowercase();
        let tiers: [(Self, &[&str]); 4] = [
            (Self::Critical, CRITICAL_KEYWORDS),
            (Self::High, HIGH_KEYWORDS),
            (Self::Medium, MEDIUM_KEYWORDS),
            (Self::Low, LOW_KEYWORDS),
        ];
        tiers
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| event.contains(keyword)))
            .map_or(Self::Low, |(severity, _)| *severity)
    }

    /// Level the event is logged at.
    pub fn log_level(self) -> LogLevel {
        match self {
            Self::Critical | Self::High => LogLevel::Error,
            Self::Medium => LogLevel::Warn,
            Self::Low => LogLevel::Info,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}
