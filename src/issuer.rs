//! Issuer configuration and resolution (C10).
//!
//! An [`IssuerConfig`] pairs an `iss` value with exactly one JWKS source.
//! [`resolve`] matches a token's `iss` claim against the configured, enabled
//! issuers. A disabled issuer is invisible, as if it were never configured.

use std::path::PathBuf;
use std::sync::Arc;

use crate::counter::SecurityEventCounter;
use crate::error::{TokenValidationError, ValidationEventType};
use crate::jwks::loader::{FileLoader, HttpLoader, InlineLoader, JwksLoader, JwksLoaderConfig, WellKnownHttpLoader};
use crate::jwks::parser::KeyAlgorithm;

/// Raw, unresolved JWKS source fields as they would appear in configuration.
///
/// Exactly one field may be set; [`IssuerConfig::new`] rejects zero or more
/// than one as a `CONFIGURATION_ERROR` rather than silently picking one.
#[derive(Debug, Clone, Default)]
pub struct JwksSourceSpec {
    pub file_path: Option<PathBuf>,
    pub inline_json: Option<String>,
    pub jwks_uri: Option<String>,
    pub well_known_uri: Option<String>,
}

impl JwksSourceSpec {
    fn configured_count(&self) -> usize {
        [
            self.file_path.is_some(),
            self.inline_json.is_some(),
            self.jwks_uri.is_some(),
            self.well_known_uri.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// A single configured issuer: its `iss` value, enabled flag, JWKS loader,
/// and the signature algorithms it accepts.
pub struct IssuerConfig {
    pub issuer: String,
    pub enabled: bool,
    pub loader: JwksLoader,
    pub algorithms: Vec<KeyAlgorithm>,
}

impl IssuerConfig {
    /// Build an issuer config, resolving `source` to exactly one [`JwksLoader`]
    /// variant. Zero or multiple configured sources are a configuration error,
    /// as is an `algorithms` entry outside the RS*/PS*/ES* safelist.
    pub fn new(
        issuer: impl Into<String>,
        enabled: bool,
        source: JwksSourceSpec,
        algorithms: &[String],
        loader_config: JwksLoaderConfig,
        counter: Arc<SecurityEventCounter>,
    ) -> Result<Self, TokenValidationError> {
        let issuer = issuer.into();

        let algorithms = algorithms
            .iter()
            .map(|alg| {
                KeyAlgorithm::parse(alg).map_err(|_| {
                    TokenValidationError::new(
                        ValidationEventType::ConfigurationInvalidIssuer,
                        format!("issuer '{issuer}' configures unsupported algorithm '{alg}'"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match source.configured_count() {
            0 => Err(TokenValidationError::new(
                ValidationEventType::ConfigurationMissingJwksSource,
                format!("issuer '{issuer}' has no JWKS source configured"),
            )),
            1 => {
                let loader = if let Some(path) = source.file_path {
                    JwksLoader::File(FileLoader::load(path, &loader_config, &counter))
                } else if let Some(json) = source.inline_json {
                    JwksLoader::Inline(InlineLoader::load(&json, &loader_config, &counter))
                } else if let Some(uri) = source.jwks_uri {
                    JwksLoader::Http(HttpLoader::new(uri, loader_config, counter))
                } else {
                    let uri = source.well_known_uri.expect("configured_count guarantees one field set");
                    JwksLoader::WellKnownHttp(WellKnownHttpLoader::new(uri, loader_config, counter))
                };
                Ok(Self { issuer, enabled, loader, algorithms })
            }
            _ => Err(TokenValidationError::new(
                ValidationEventType::ConfigurationMixedJwksSource,
                format!("issuer '{issuer}' has more than one JWKS source configured"),
            )),
        }
    }

    /// Trigger loader initialization (a no-op for file/inline sources).
    pub async fn init_async(&self) {
        self.loader.init_async().await;
    }

    pub fn shutdown(&self) {
        self.loader.shutdown();
    }
}

/// Find the enabled issuer config matching `iss_claim`.
///
/// Disabled issuers are treated as if they did not exist: a token whose
/// `iss` matches a disabled entry is rejected the same as an unconfigured one.
pub fn resolve<'a>(
    issuers: &'a [IssuerConfig],
    iss_claim: Option<&str>,
) -> Result<&'a IssuerConfig, TokenValidationError> {
    let iss_claim = iss_claim.ok_or_else(|| {
        TokenValidationError::new(ValidationEventType::ClaimMissingClaim, "token has no 'iss' claim")
    })?;

    issuers
        .iter()
        .find(|cfg| cfg.enabled && cfg.issuer == iss_claim)
        .ok_or_else(|| {
            TokenValidationError::new(
                ValidationEventType::ClaimIssuerNotConfigured,
                format!("issuer '{iss_claim}' is not configured or is disabled"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Arc<SecurityEventCounter> {
        Arc::new(SecurityEventCounter::new())
    }

    #[test]
    fn rejects_zero_sources() {
        let err = IssuerConfig::new(
            "https://idp.example.com",
            true,
            JwksSourceSpec::default(),
            &["RS256".to_string()],
            JwksLoaderConfig::default(),
            counter(),
        )
        .unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ConfigurationMissingJwksSource);
    }

    #[test]
    fn rejects_mixed_sources() {
        let source = JwksSourceSpec {
            inline_json: Some("{\"keys\":[]}".to_string()),
            jwks_uri: Some("https://idp.example.com/jwks.json".to_string()),
            ..JwksSourceSpec::default()
        };
        let err = IssuerConfig::new(
            "https://idp.example.com",
            true,
            source,
            &["RS256".to_string()],
            JwksLoaderConfig::default(),
            counter(),
        )
        .unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ConfigurationMixedJwksSource);
    }

    #[test]
    fn accepts_single_inline_source() {
        let source = JwksSourceSpec {
            inline_json: Some(
                serde_json::json!({"keys": [{"kty": "RSA", "alg": "RS256", "kid": "k1", "n": "AQAB", "e": "AQAB"}]})
                    .to_string(),
            ),
            ..JwksSourceSpec::default()
        };
        let cfg = IssuerConfig::new(
            "https://idp.example.com",
            true,
            source,
            &["RS256".to_string()],
            JwksLoaderConfig::default(),
            counter(),
        )
        .unwrap();
        assert!(matches!(cfg.loader, JwksLoader::Inline(_)));
    }

    fn inline_issuer(issuer: &str, enabled: bool) -> IssuerConfig {
        let source = JwksSourceSpec {
            inline_json: Some(
                serde_json::json!({"keys": [{"kty": "RSA", "alg": "RS256", "kid": "k1", "n": "AQAB", "e": "AQAB"}]})
                    .to_string(),
            ),
            ..JwksSourceSpec::default()
        };
        IssuerConfig::new(
            issuer,
            enabled,
            source,
            &["RS256".to_string()],
            JwksLoaderConfig::default(),
            counter(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_unsupported_configured_algorithm() {
        let source = JwksSourceSpec {
            inline_json: Some("{\"keys\":[]}".to_string()),
            ..JwksSourceSpec::default()
        };
        let err = IssuerConfig::new(
            "https://idp.example.com",
            true,
            source,
            &["HS256".to_string()],
            JwksLoaderConfig::default(),
            counter(),
        )
        .unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ConfigurationInvalidIssuer);
    }

    #[test]
    fn resolve_finds_enabled_matching_issuer() {
        let issuers = vec![inline_issuer("https://a.example.com", true)];
        let resolved = resolve(&issuers, Some("https://a.example.com")).unwrap();
        assert_eq!(resolved.issuer, "https://a.example.com");
    }

    #[test]
    fn resolve_treats_disabled_issuer_as_unconfigured() {
        let issuers = vec![inline_issuer("https://a.example.com", false)];
        let err = resolve(&issuers, Some("https://a.example.com")).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimIssuerNotConfigured);
    }

    #[test]
    fn resolve_rejects_missing_iss_claim() {
        let issuers = vec![inline_issuer("https://a.example.com", true)];
        let err = resolve(&issuers, None).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimMissingClaim);
    }
}
