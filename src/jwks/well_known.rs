//! Well-known (OIDC discovery) resolver (C7).

use serde::Deserialize;

use crate::http_handler::{ContentConverter, HttpHandlerConfig, ResilientHttpHandler};
use crate::http_result::HttpResultState;

/// The fields this crate actually needs from an OIDC discovery document.
/// Extra fields in the real document are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WellKnownDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

/// Resolved discovery result: the issuer the document claims, and the JWKS URL.
#[derive(Debug, Clone)]
pub struct ResolvedWellKnown {
    pub issuer: String,
    pub jwks_uri: String,
}

/// Failures from resolving a discovery document.
#[derive(Debug, thiserror::Error)]
pub enum WellKnownError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("discovery document issuer '{actual}' does not match discovery URL origin '{expected}'")]
    IssuerMismatch { expected: String, actual: String },
    #[error("invalid discovery URL: {0}")]
    InvalidUrl(String),
}

struct WellKnownConverter;
impl ContentConverter<WellKnownDocument> for WellKnownConverter {
    fn convert(&self, bytes: &[u8]) -> Result<WellKnownDocument, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

/// Derive the expected issuer (scheme + host, `/.well-known/openid-configuration` stripped)
/// from a discovery URL.
fn expected_issuer_from_discovery_url(discovery_url: &str) -> Result<String, WellKnownError> {
    let trimmed = discovery_url
        .trim_end_matches("/.well-known/openid-configuration")
        .trim_end_matches('/');
    let parsed = url::Url::parse(trimmed).map_err(|e| WellKnownError::InvalidUrl(e.to_string()))?;
    Ok(format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default()
    ))
}

/// Fetch and validate a discovery document at `discovery_url`.
///
/// Rejects an `issuer` field that does not match the scheme+host of
/// `discovery_url` with [`WellKnownError::IssuerMismatch`] (a `CONFIGURATION_ERROR`
/// at the caller).
pub async fn resolve(discovery_url: &str) -> Result<ResolvedWellKnown, WellKnownError> {
    let expected = expected_issuer_from_discovery_url(discovery_url)?;

    let handler = ResilientHttpHandler::new(discovery_url, HttpHandlerConfig::default(), WellKnownConverter)
        .map_err(|e| WellKnownError::Fetch(e.to_string()))?;

    let result = handler.load(None).await;
    if result.state != HttpResultState::Valid {
        let detail = result
            .error
            .map(|e| e.detail)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(WellKnownError::Fetch(detail));
    }

    let document = result
        .content
        .ok_or_else(|| WellKnownError::Fetch("empty discovery response".to_string()))?;

    if !issuer_matches(&expected, &document.issuer) {
        return Err(WellKnownError::IssuerMismatch {
            expected,
            actual: document.issuer,
        });
    }

    Ok(ResolvedWellKnown {
        issuer: document.issuer,
        jwks_uri: document.jwks_uri,
    })
}

fn issuer_matches(expected: &str, actual: &str) -> bool {
    let actual_trimmed = actual.trim_end_matches('/');
    expected == actual_trimmed || expected == actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn expected_issuer_strips_well_known_suffix() {
        let issuer =
            expected_issuer_from_discovery_url("https://idp.example.com/.well-known/openid-configuration")
                .unwrap();
        assert_eq!(issuer, "https://idp.example.com");
    }

    #[tokio::test]
    async fn resolves_issuer_and_jwks_uri_on_match() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        let body = serde_json::json!({
            "issuer": issuer,
            "jwks_uri": format!("{issuer}/jwks.json"),
        });

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let discovery_url = format!("{issuer}/.well-known/openid-configuration");
        let resolved = resolve(&discovery_url).await.unwrap();
        assert_eq!(resolved.issuer, issuer);
        assert_eq!(resolved.jwks_uri, format!("{issuer}/jwks.json"));
    }

    #[tokio::test]
    async fn rejects_issuer_mismatch() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "issuer": "https://attacker.example.com",
            "jwks_uri": "https://attacker.example.com/jwks.json",
        });

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let discovery_url = format!("{}/.well-known/openid-configuration", server.uri());
        let err = resolve(&discovery_url).await.unwrap_err();
        assert!(matches!(err, WellKnownError::IssuerMismatch { .. }));
    }
}
