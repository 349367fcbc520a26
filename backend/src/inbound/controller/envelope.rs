//! Transport-agnostic request and response envelopes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Error;

/// Header carrying a caller-supplied correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Partial update.
    Patch,
    /// Remove.
    Delete,
}

impl Method {
    /// Uppercase method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method changes state.
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// Authenticated caller attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUser {
    /// Caller identifier.
    pub id: String,
    /// Optional role used by authorisation hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl RequestUser {
    /// Caller without a role.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
        }
    }

    /// Attach a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Whether the caller holds one of `roles`.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| roles.contains(&role))
    }
}

/// Inbound request envelope.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Target path.
    pub url: String,
    /// Lowercased header names with their values.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Path parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Query-string parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Body; `null` when absent.
    #[serde(default)]
    pub body: Value,
    /// Authenticated caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<RequestUser>,
}

impl Request {
    /// Empty request for `method` and `url`.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            body: Value::Null,
            user: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a path parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a query-string parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Attach the caller.
    #[must_use]
    pub fn with_user(mut self, user: RequestUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Path parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Query-string value.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Outbound response envelope.
///
/// Exactly one of `data` and `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Optional human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Status code.
    pub status_code: u16,
    /// Instant the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Correlation id shared by every log line of the request.
    pub correlation_id: String,
}

impl Response {
    pub(crate) fn ok(
        data: Value,
        message: Option<String>,
        status_code: u16,
        timestamp: DateTime<Utc>,
        correlation_id: String,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message,
            status_code,
            timestamp,
            correlation_id,
        }
    }

    pub(crate) fn failed(
        error: Error,
        status_code: u16,
        timestamp: DateTime<Utc>,
        correlation_id: String,
    ) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.message().to_owned()),
            error: Some(error),
            status_code,
            timestamp,
            correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn headers_are_case_insensitive() {
        let request = Request::new(Method::Get, "/x").with_header("X-Correlation-Id", "abc");
        assert_eq!(request.header(CORRELATION_ID_HEADER), Some("abc"));
        assert_eq!(request.header("X-CORRELATION-ID"), Some("abc"));
    }

    #[rstest]
    fn requests_decode_with_defaults() {
        let request: Request =
            serde_json::from_value(json!({ "method": "DELETE", "url": "/a/1" })).expect("decode");
        assert_eq!(request.method, Method::Delete);
        assert!(request.user.is_none());
        assert_eq!(request.body, Value::Null);
    }

    #[rstest]
    #[case(Some("admin"), true)]
    #[case(Some("viewer"), false)]
    #[case(None, false)]
    fn role_checks(#[case] role: Option<&str>, #[case] expected: bool) {
        let mut user = RequestUser::new("u1");
        user.role = role.map(str::to_owned);
        assert_eq!(user.has_any_role(&["editor", "admin"]), expected);
    }

    #[rstest]
    fn failed_responses_carry_the_error_message() {
        let response = Response::failed(Error::not_found("gone"), 404, Utc::now(), "c-1".into());
        let value = serde_json::to_value(&response).expect("serialise");
        assert_eq!(value["success"], false);
        assert_eq!(value["statusCode"], 404);
        assert_eq!(value["message"], "gone");
        assert_eq!(value["error"]["code"], "not_found");
        assert_eq!(value["correlationId"], "c-1");
        assert!(value.get("data").is_none());
    }
}
