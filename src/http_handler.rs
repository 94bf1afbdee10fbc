//! Resilient, ETag-aware HTTP handler (C4): the transport substrate for JWKS
//! and well-known document fetches.

use std::time::Duration;

use reqwest::StatusCode;

use crate::http_result::{ErrorCategory, HttpResult};
use crate::retry::{execute, RetryMetrics, RetryStrategy, TracingRetryMetrics};

/// Converts a raw HTTP response body into a typed value `T`.
///
/// A closed set of converters back this crate: JSON-to-JWKS (C5) and
/// JSON-to-well-known-document (C7). Matches §9's guidance to model this as
/// a small interface rather than open inheritance.
pub trait ContentConverter<T>: Send + Sync {
    /// Parse `bytes` into `T`, or return a human-readable parse failure.
    fn convert(&self, bytes: &[u8]) -> Result<T, String>;
}

/// Configuration for a single [`ResilientHttpHandler`].
#[derive(Debug, Clone)]
pub struct HttpHandlerConfig {
    /// Connect timeout, mandatory and bounded.
    pub connect_timeout: Duration,
    /// Read timeout, mandatory and bounded.
    pub read_timeout: Duration,
    /// Retry strategy applied to the network call.
    pub retry: RetryStrategy,
}

impl Default for HttpHandlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry: RetryStrategy::default(),
        }
    }
}

/// Performs a single conditional `GET` against `url`, applying retry to the
/// network call and a [`ContentConverter`] to a successful body.
pub struct ResilientHttpHandler<T> {
    url: String,
    client: reqwest::Client,
    config: HttpHandlerConfig,
    converter: Box<dyn ContentConverter<T> + Send + Sync>,
    metrics: Box<dyn RetryMetrics>,
}

impl<T> ResilientHttpHandler<T> {
    /// Build a handler for `url` using `converter` to parse successful bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest::Client` cannot be built
    /// (e.g. invalid TLS configuration).
    pub fn new(
        url: impl Into<String>,
        config: HttpHandlerConfig,
        converter: impl ContentConverter<T> + Send + Sync + 'static,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;

        Ok(Self {
            url: url.into(),
            client,
            config,
            converter: Box::new(converter),
            metrics: Box::new(TracingRetryMetrics),
        })
    }

    /// Perform one conditional `GET`, sending `If-None-Match: etag` when present,
    /// retrying while the classified outcome is [`ErrorCategory::is_retryable`].
    pub async fn load(&self, etag: Option<&str>) -> HttpResult<T> {
        let outcome: Result<HttpResult<T>, HttpResult<T>> = execute(
            &self.config.retry,
            &self.url,
            self.metrics.as_ref(),
            None,
            HttpResult::is_retryable,
            || self.attempt(etag),
        )
        .await;

        match outcome {
            Ok(result) | Err(result) => result,
        }
    }

    /// Perform a single request and classify it. `Err` marks a retryable
    /// outcome (fed back into the retry loop); `Ok` marks a terminal one,
    /// success or a failure the retry engine shouldn't repeat.
    async fn attempt(&self, etag: Option<&str>) -> Result<HttpResult<T>, HttpResult<T>> {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(err) => return Err(HttpResult::error(ErrorCategory::NetworkError, err.to_string(), None)),
        };

        let status = response.status();
        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::NOT_MODIFIED {
            return Ok(HttpResult::not_modified(new_etag.or_else(|| etag.map(str::to_string))));
        }

        if status.is_client_error() {
            return Ok(HttpResult::error(
                ErrorCategory::ClientError,
                format!("unexpected client error status {status}"),
                Some(status.as_u16()),
            ));
        }

        if status.is_server_error() {
            return Err(HttpResult::error(
                ErrorCategory::ServerError,
                format!("unexpected server error status {status}"),
                Some(status.as_u16()),
            ));
        }

        if !status.is_success() {
            return Ok(HttpResult::error(
                ErrorCategory::InvalidContent,
                format!("unexpected status {status}"),
                Some(status.as_u16()),
            ));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Err(HttpResult::error(ErrorCategory::NetworkError, err.to_string(), Some(status.as_u16())));
            }
        };

        match self.converter.convert(&bytes) {
            Ok(content) => Ok(HttpResult::valid(content, new_etag, status.as_u16())),
            Err(detail) => Ok(HttpResult::error(ErrorCategory::InvalidContent, detail, Some(status.as_u16()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_result::HttpResultState;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct IdentityConverter;
    impl ContentConverter<String> for IdentityConverter {
        fn convert(&self, bytes: &[u8]) -> Result<String, String> {
            String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
        }
    }

    #[tokio::test]
    async fn success_returns_content_and_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello").insert_header("ETag", "\"v1\""))
            .mount(&server)
            .await;

        let handler = ResilientHttpHandler::new(
            format!("{}/doc", server.uri()),
            HttpHandlerConfig::default(),
            IdentityConverter,
        )
        .unwrap();

        let result = handler.load(None).await;
        assert_eq!(result.state, HttpResultState::Valid);
        assert_eq!(result.content.as_deref(), Some("hello"));
        assert_eq!(result.etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn not_modified_has_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let handler = ResilientHttpHandler::new(
            format!("{}/doc", server.uri()),
            HttpHandlerConfig::default(),
            IdentityConverter,
        )
        .unwrap();

        let result = handler.load(Some("\"v1\"")).await;
        assert_eq!(result.state, HttpResultState::Valid);
        assert!(result.unchanged);
        assert!(result.content.is_none());
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut config = HttpHandlerConfig::default();
        config.retry = RetryStrategy::new(Duration::from_millis(1), Duration::from_millis(5), 2.0, 3);

        let handler = ResilientHttpHandler::new(format!("{}/doc", server.uri()), config, IdentityConverter)
            .unwrap();

        let result = handler.load(None).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::ClientError);
    }

    #[tokio::test]
    async fn server_error_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let mut config = HttpHandlerConfig::default();
        config.retry = RetryStrategy::new(Duration::from_millis(1), Duration::from_millis(2), 2.0, 2);

        let handler = ResilientHttpHandler::new(format!("{}/doc", server.uri()), config, IdentityConverter)
            .unwrap();

        let result = handler.load(None).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::ServerError);
        // `.expect(2)` above is verified when `server` drops at the end of
        // this test, asserting the 503 was actually retried once.
    }

    #[tokio::test]
    async fn invalid_content_is_reported_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe]))
            .mount(&server)
            .await;

        let handler = ResilientHttpHandler::new(
            format!("{}/doc", server.uri()),
            HttpHandlerConfig::default(),
            IdentityConverter,
        )
        .unwrap();

        let result = handler.load(None).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::InvalidContent);
    }
}
