//! Status codes for domain errors and redaction of internal failures.

use crate::domain::{Error, ErrorCode};

/// Status code conventionally associated with `code`.
///
/// Controllers use this to refine execution failures; the pipeline itself
/// reports stage-determined statuses.
pub fn status_for(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::InvalidRequest | ErrorCode::InvalidId | ErrorCode::InvalidParameters => 400,
        ErrorCode::Unauthorized => 401,
        ErrorCode::Forbidden => 403,
        ErrorCode::NotFound => 404,
        ErrorCode::Conflict | ErrorCode::InvalidTransactionState => 409,
        ErrorCode::ServiceUnavailable => 503,
        ErrorCode::TransactionAborted | ErrorCode::InternalError => 500,
    }
}

/// Replace internal error details with a generic message, keeping the
/// correlation id.
pub(crate) fn redact_if_internal(error: Error) -> Error {
    if error.code() != ErrorCode::InternalError {
        return error;
    }
    let redacted = Error::internal("Internal server error");
    match error.correlation_id() {
        Some(id) => redacted.with_correlation_id(id.to_owned()),
        None => redacted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::InvalidId, 400)]
    #[case(ErrorCode::InvalidParameters, 400)]
    #[case(ErrorCode::NotFound, 404)]
    #[case(ErrorCode::Conflict, 409)]
    #[case(ErrorCode::ServiceUnavailable, 503)]
    #[case(ErrorCode::TransactionAborted, 500)]
    fn maps_codes_to_statuses(#[case] code: ErrorCode, #[case] expected: u16) {
        assert_eq!(status_for(code), expected);
    }

    #[rstest]
    fn internal_errors_are_redacted() {
        let err = Error::internal("db password rejected").with_correlation_id("c-9");
        let redacted = redact_if_internal(err);
        assert_eq!(redacted.message(), "Internal server error");
        assert_eq!(redacted.correlation_id(), Some("c-9"));
    }

    #[rstest]
    fn other_errors_pass_through() {
        let err = Error::not_found("artifact a1 not found");
        assert_eq!(redact_if_internal(err.clone()), err);
    }
}
