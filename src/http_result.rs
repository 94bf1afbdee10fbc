//! Unified result value returned by the resilient HTTP handler (C4).

use std::fmt;

/// Outcome state of an [`crate::http_handler::ResilientHttpHandler::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpResultState {
    /// Content parsed successfully (or unchanged via a `304`).
    Valid,
    /// A non-fatal condition worth surfacing but not an error (currently unused
    /// by any built-in classification; reserved for collaborator extensions).
    Warning,
    /// The fetch or parse failed; see `error`.
    Error,
}

/// Classification of an HTTP-layer failure, mirroring §3's error categories.
///
/// Only [`ErrorCategory::NetworkError`] and [`ErrorCategory::ServerError`] are
/// retryable; the retry engine (C2) consults this when deciding whether to
/// invoke the operation again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// I/O, DNS, TLS, or connect/read timeout failure.
    NetworkError,
    /// HTTP 5xx response.
    ServerError,
    /// HTTP 4xx response.
    ClientError,
    /// HTTP 200/304 response whose body failed to parse.
    InvalidContent,
    /// The caller's own configuration was invalid (e.g. issuer mismatch).
    ConfigurationError,
}

impl ErrorCategory {
    /// Whether the retry engine should re-invoke the operation for this category.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError | Self::ServerError)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `(category, detail)` pair describing a non-valid [`HttpResult`].
#[derive(Debug, Clone)]
pub struct HttpErrorDetail {
    /// Coarse classification used for retry decisions.
    pub category: ErrorCategory,
    /// Human-readable detail, not guaranteed stable across versions.
    pub detail: String,
}

/// Result of one HTTP load attempt, generic over the parsed content type `T`.
///
/// This is the value C4 hands to C6/C7: it carries enough information
/// (ETag, status, "was this a 304") for a loader to decide whether to swap
/// in new content or keep what it already has.
#[derive(Debug, Clone)]
pub struct HttpResult<T> {
    /// Overall outcome state.
    pub state: HttpResultState,
    /// Parsed content, present only on a `200` response that parsed cleanly.
    pub content: Option<T>,
    /// ETag returned by the server, if any.
    pub etag: Option<String>,
    /// Raw HTTP status code, if a response was received at all.
    pub status: Option<u16>,
    /// Set when `state == Error`.
    pub error: Option<HttpErrorDetail>,
    /// `true` when this result represents a `304 Not Modified` response.
    pub unchanged: bool,
}

impl<T> HttpResult<T> {
    /// Build a successful result carrying fresh content.
    #[must_use]
    pub fn valid(content: T, etag: Option<String>, status: u16) -> Self {
        Self {
            state: HttpResultState::Valid,
            content: Some(content),
            etag,
            status: Some(status),
            error: None,
            unchanged: false,
        }
    }

    /// Build a successful-but-unchanged result for a `304`.
    #[must_use]
    pub fn not_modified(etag: Option<String>) -> Self {
        Self {
            state: HttpResultState::Valid,
            content: None,
            etag,
            status: Some(304),
            error: None,
            unchanged: true,
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn error(category: ErrorCategory, detail: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            state: HttpResultState::Error,
            content: None,
            etag: None,
            status,
            error: Some(HttpErrorDetail {
                category,
                detail: detail.into(),
            }),
            unchanged: false,
        }
    }

    /// Whether this result represents a retryable failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.category.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_server_errors_are_retryable() {
        let net: HttpResult<()> = HttpResult::error(ErrorCategory::NetworkError, "timeout", None);
        let srv: HttpResult<()> = HttpResult::error(ErrorCategory::ServerError, "500", Some(500));
        assert!(net.is_retryable());
        assert!(srv.is_retryable());
    }

    #[test]
    fn client_and_content_errors_are_not_retryable() {
        let client: HttpResult<()> = HttpResult::error(ErrorCategory::ClientError, "404", Some(404));
        let content: HttpResult<()> =
            HttpResult::error(ErrorCategory::InvalidContent, "bad json", Some(200));
        assert!(!client.is_retryable());
        assert!(!content.is_retryable());
    }

    #[test]
    fn not_modified_has_no_content_but_is_valid() {
        let result: HttpResult<String> = HttpResult::not_modified(Some("\"abc\"".into()));
        assert_eq!(result.state, HttpResultState::Valid);
        assert!(result.unchanged);
        assert!(result.content.is_none());
    }
}
