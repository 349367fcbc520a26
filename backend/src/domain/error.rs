//! Domain-level error types.
//!
//! These errors are transport agnostic. The controller layer is the only
//! place that turns them into response envelopes and status codes; the
//! repository and service layers log them and hand them back to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::CorrelationId;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The payload is malformed or breaks a business rule.
    InvalidRequest,
    /// An entity identifier is empty or malformed.
    InvalidId,
    /// Query parameters such as page or limit are out of range.
    InvalidParameters,
    /// Authentication failed or is missing.
    Unauthorized,
    /// Authenticated but not permitted to perform this action.
    Forbidden,
    /// The requested resource does not exist.
    NotFound,
    /// A concurrent writer changed the entity first.
    Conflict,
    /// A transaction was committed or rolled back after reaching a terminal state.
    InvalidTransactionState,
    /// An operation inside a transaction failed and aborted the rest.
    TransactionAborted,
    /// The backing store is unreachable.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

impl ErrorCode {
    fn fallback_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "validation failed",
            Self::InvalidId => "invalid id",
            Self::InvalidParameters => "invalid parameters",
            Self::Unauthorized => "authentication required",
            Self::Forbidden => "access denied",
            Self::NotFound => "not found",
            Self::Conflict => "conflicting update",
            Self::InvalidTransactionState => "transaction is not active",
            Self::TransactionAborted => "transaction aborted",
            Self::ServiceUnavailable => "service unavailable",
            Self::InternalError => "internal error",
        }
    }
}

/// Domain error payload.
///
/// Constructors capture the [`CorrelationId`] in scope, if any, so errors
/// surfaced from deep inside a request can be tied back to its log lines.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use dashboard_backend::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("artifact abc not found");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
pub struct Error {
    code: ErrorCode,
    message: String,
    correlation_id: Option<String>,
    details: Option<Value>,
}

/// Validation errors emitted by the fallible constructor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was blank.
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error. A blank message is replaced by a generic
    /// description of `code`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::try_new(code, message).unwrap_or_else(|_| Self {
            code,
            message: code.fallback_message().to_owned(),
            correlation_id: CorrelationId::current().map(|id| id.to_string()),
            details: None,
        })
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(code: ErrorCode, message: impl Into<String>) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            correlation_id: CorrelationId::current().map(|id| id.to_string()),
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary structured details.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Correlation identifier captured when the error was raised.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use dashboard_backend::domain::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::validation("bad").with_details(json!({ "field": "name" }));
    /// assert!(err.details().is_some());
    /// ```
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the captured correlation identifier.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidId`].
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidId, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidParameters`].
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameters, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Convenience constructor for [`ErrorCode::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidTransactionState`].
    pub fn invalid_transaction_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTransactionState, message)
    }

    /// Convenience constructor for [`ErrorCode::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Build a [`ErrorCode::TransactionAborted`] error naming the failing
    /// operation and embedding its cause.
    ///
    /// # Examples
    /// ```
    /// use dashboard_backend::domain::Error;
    ///
    /// let err = Error::transaction_aborted(2, &Error::not_found("gone"));
    /// assert_eq!(err.failed_index(), Some(2));
    /// ```
    pub fn transaction_aborted(index: usize, cause: &Error) -> Self {
        Self::new(
            ErrorCode::TransactionAborted,
            format!("operation {index} failed: {}", cause.message()),
        )
        .with_details(json!({
            "failedIndex": index,
            "cause": {
                "code": cause.code(),
                "message": cause.message(),
            },
        }))
    }

    /// Index of the failing operation for [`ErrorCode::TransactionAborted`].
    pub fn failed_index(&self) -> Option<usize> {
        if self.code != ErrorCode::TransactionAborted {
            return None;
        }
        self.details
            .as_ref()
            .and_then(|details| details.get("failedIndex"))
            .and_then(Value::as_u64)
            .and_then(|index| usize::try_from(index).ok())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
            correlation_id: value.correlation_id,
            details: value.details,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        let ErrorDto {
            code,
            message,
            correlation_id,
            details,
        } = value;

        let mut error = Error::try_new(code, message)?;
        error.correlation_id = correlation_id;
        error.details = details;
        Ok(error)
    }
}
