//! Caller-facing error taxonomy for search operations.
//!
//! Every failure surfaced by [`crate::search::SearchDispatcher`] carries exactly one
//! [`ErrorCode`]. Codes are stable identifiers that callers may match on; the attached message
//! is descriptive only and may change between releases.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of error kinds exposed to search callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum ErrorCode {
    /// Malformed or missing search parameters.
    InvalidRequest,
    /// Downstream search execution failed.
    SearchFailed,
    /// Vector-mode search requested but disabled in this deployment.
    VectorSearchNotImplemented,
    /// Combined keyword and vector search requested but disabled in this deployment.
    HybridSearchNotImplemented,
    /// Unclassified failure.
    InternalError,
}

/// How a caller should treat a failure carrying a given [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The input is wrong; the caller must fix it before trying again.
    Never,
    /// Capability gap; no retry can succeed against this build.
    Permanent,
    /// Possibly transient; retrying is left to the caller.
    CallerDiscretion,
}

impl ErrorCode {
    /// Every code in declaration order.
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::InvalidRequest,
        ErrorCode::SearchFailed,
        ErrorCode::VectorSearchNotImplemented,
        ErrorCode::HybridSearchNotImplemented,
        ErrorCode::InternalError,
    ];

    /// Stable wire identifier.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "SEARCH_001",
            ErrorCode::SearchFailed => "SEARCH_002",
            ErrorCode::VectorSearchNotImplemented => "SEARCH_003",
            ErrorCode::HybridSearchNotImplemented => "SEARCH_004",
            ErrorCode::InternalError => "SEARCH_999",
        }
    }

    /// Default human-readable message.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Invalid search request parameters",
            ErrorCode::SearchFailed => "Search failed",
            ErrorCode::VectorSearchNotImplemented => "Vector search is not implemented",
            ErrorCode::HybridSearchNotImplemented => "Hybrid search is not implemented",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// Retry classification for this code.
    pub const fn retry_policy(self) -> RetryPolicy {
        match self {
            ErrorCode::InvalidRequest => RetryPolicy::Never,
            ErrorCode::VectorSearchNotImplemented | ErrorCode::HybridSearchNotImplemented => {
                RetryPolicy::Permanent
            }
            ErrorCode::SearchFailed | ErrorCode::InternalError => RetryPolicy::CallerDiscretion,
        }
    }

    /// Look up a code by its wire identifier.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<ErrorCode> for &'static str {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error raised by search operations.
///
/// Carries one [`ErrorCode`], an optional detail that replaces the default message when present,
/// and an optional wrapped cause.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct SearchError {
    code: ErrorCode,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SearchError {
    /// Build an error carrying the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            source: None,
        }
    }

    /// Replace the default message with a caller-facing detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.message = detail.into();
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Malformed or missing parameters.
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest).with_detail(detail)
    }

    /// Downstream execution failure.
    pub fn search_failed(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorCode::SearchFailed)
            .with_detail(detail)
            .with_source(source)
    }

    /// Unclassified failure.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError).with_detail(detail)
    }

    /// Stable code carried by this error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Caller-facing message (detail when supplied, default message otherwise).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        self.code.retry_policy() == RetryPolicy::CallerDiscretion
    }
}

impl From<crate::search::IndexError> for SearchError {
    fn from(error: crate::search::IndexError) -> Self {
        let detail = format!("Search index query failed: {error}");
        SearchError::search_failed(detail, error)
    }
}

impl From<crate::embedding::VectorizationError> for SearchError {
    fn from(error: crate::embedding::VectorizationError) -> Self {
        let detail = format!("Query vectorization failed: {error}");
        SearchError::search_failed(detail, error)
    }
}

impl From<crate::cache::CacheError> for SearchError {
    fn from(error: crate::cache::CacheError) -> Self {
        SearchError::internal(format!("Cache access failed: {error}")).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn codes_are_stable() {
        let codes: Vec<&str> = ErrorCode::ALL.iter().map(|code| code.code()).collect();
        assert_eq!(
            codes,
            ["SEARCH_001", "SEARCH_002", "SEARCH_003", "SEARCH_004", "SEARCH_999"]
        );
    }

    #[test]
    fn from_code_round_trips_every_variant() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code("SEARCH_000"), None);
    }

    #[test]
    fn retry_policy_matches_error_kind() {
        assert_eq!(ErrorCode::InvalidRequest.retry_policy(), RetryPolicy::Never);
        assert_eq!(
            ErrorCode::VectorSearchNotImplemented.retry_policy(),
            RetryPolicy::Permanent
        );
        assert_eq!(
            ErrorCode::HybridSearchNotImplemented.retry_policy(),
            RetryPolicy::Permanent
        );
        assert!(SearchError::new(ErrorCode::SearchFailed).is_retryable());
        assert!(SearchError::internal("boom").is_retryable());
        assert!(!SearchError::invalid_request("empty query").is_retryable());
    }

    #[test]
    fn detail_replaces_default_message_and_keeps_code() {
        let error = SearchError::invalid_request("query text must not be empty");
        assert_eq!(error.code(), ErrorCode::InvalidRequest);
        assert_eq!(error.message(), "query text must not be empty");
        assert_eq!(
            error.to_string(),
            "SEARCH_001: query text must not be empty"
        );

        let plain = SearchError::new(ErrorCode::VectorSearchNotImplemented);
        assert_eq!(plain.message(), "Vector search is not implemented");
    }

    #[test]
    fn wrapped_cause_is_exposed_as_source() {
        let cause = std::io::Error::other("connection reset");
        let error = SearchError::search_failed("keyword query failed", cause);
        let source = error.source().expect("source present");
        assert_eq!(source.to_string(), "connection reset");
    }

    #[test]
    fn code_serializes_as_wire_identifier() {
        let value = serde_json::to_value(ErrorCode::HybridSearchNotImplemented).expect("json");
        assert_eq!(value, serde_json::json!("SEARCH_004"));
    }
}
