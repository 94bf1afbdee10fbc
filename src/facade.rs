//! Public facade (C15): [`TokenValidator`] is the single entry point a
//! consumer constructs once and calls for the lifetime of the process.
//!
//! It owns the ordered issuer configs, the shared parser/claim/cache
//! settings, and the process-wide [`SecurityEventCounter`], and exposes the
//! three operations from §6's public API surface.

use std::sync::Arc;

use chrono::Utc;

use crate::cache::AccessTokenCache;
use crate::claim_validator::ClaimValidatorConfig;
use crate::claims::{ClaimMapper, DateTimeMapper, KeycloakDefaultGroupsMapper, KeycloakDefaultRolesMapper, ScopeMapper};
use crate::config::ValidatorSettings;
use crate::counter::SecurityEventCounter;
use crate::error::TokenValidationError;
use crate::issuer::{IssuerConfig, JwksSourceSpec};
use crate::parser::ParserLimits;
use crate::pipeline::{self, AccessTokenContent, IdTokenContent, RefreshTokenContent};

fn jwks_source_spec(jwks: &crate::config::JwksSourceConfig) -> JwksSourceSpec {
    JwksSourceSpec {
        file_path: jwks.file_path.clone(),
        inline_json: jwks.inline.clone(),
        jwks_uri: jwks.http_url.clone(),
        well_known_uri: jwks.http_well_known_url.clone(),
    }
}

/// Every issuer gets the same claim mapper set: `scope`, `exp` (needed to
/// derive the cache TTL), and the two Keycloak mappers, which simply project
/// to an empty list when their source claims are absent.
fn default_mappers() -> Vec<(String, Box<dyn ClaimMapper>)> {
    vec![
        ("scope".to_string(), Box::new(ScopeMapper)),
        ("exp".to_string(), Box::new(DateTimeMapper)),
        ("roles".to_string(), Box::new(KeycloakDefaultRolesMapper)),
        ("groups".to_string(), Box::new(KeycloakDefaultGroupsMapper)),
    ]
}

/// The single entry point for access-, ID-, and refresh-token validation.
pub struct TokenValidator {
    issuers: Vec<IssuerConfig>,
    parser_limits: ParserLimits,
    claim_config: ClaimValidatorConfig,
    mappers: Vec<(String, Box<dyn ClaimMapper>)>,
    expected_client_id: String,
    counter: Arc<SecurityEventCounter>,
    access_cache: AccessTokenCache<AccessTokenContent>,
    id_cache: AccessTokenCache<IdTokenContent>,
}

impl TokenValidator {
    /// Build a validator from [`ValidatorSettings`]. `expected_client_id` is
    /// this relying party's own client ID, checked against `aud`/`azp` on ID
    /// tokens regardless of which configured issuer signed them.
    pub fn new(
        settings: &ValidatorSettings,
        expected_client_id: impl Into<String>,
    ) -> Result<Self, TokenValidationError> {
        let counter = Arc::new(SecurityEventCounter::new());

        let mut issuers = Vec::with_capacity(settings.issuers.len());
        for issuer_settings in settings.issuers.values() {
            let loader_config = issuer_settings.to_jwks_loader_config(&settings.retry);
            let source = jwks_source_spec(&issuer_settings.jwks);
            let issuer = IssuerConfig::new(
                issuer_settings.issuer_identifier.clone(),
                issuer_settings.enabled,
                source,
                &issuer_settings.algorithms,
                loader_config,
                Arc::clone(&counter),
            )?;
            issuers.push(issuer);
        }

        let mut required_claims = vec!["iss".to_string(), "exp".to_string()];
        if !settings.issuers.values().any(|i| i.claim_sub_optional) {
            required_claims.push("sub".to_string());
        }

        Ok(Self {
            issuers,
            parser_limits: settings.parser.to_parser_limits(),
            claim_config: ClaimValidatorConfig {
                leeway: settings.parser.leeway(),
                required_claims,
                validate_expiration: settings.parser.validate_expiration,
                validate_not_before: settings.parser.validate_not_before,
                validate_issued_at: settings.parser.validate_issued_at,
            },
            mappers: default_mappers(),
            expected_client_id: expected_client_id.into(),
            counter: Arc::clone(&counter),
            access_cache: AccessTokenCache::new(settings.cache.to_cache_config(), Arc::clone(&counter)),
            id_cache: AccessTokenCache::new(settings.cache.to_cache_config(), counter),
        })
    }

    /// Trigger initialization of every configured issuer's JWKS loader.
    /// HTTP-backed loaders fetch and start their refresh loop; file/inline
    /// loaders already loaded at construction.
    pub async fn init_async(&self) {
        for issuer in &self.issuers {
            issuer.init_async().await;
        }
    }

    /// Validate an access token: structure, issuer, signature, mandatory and
    /// temporal claims, then project the configured claim mappers.
    pub async fn create_access_token(&self, raw_token: &str) -> Result<AccessTokenContent, TokenValidationError> {
        if let Some(cached) = self.access_cache.get(raw_token) {
            return Ok(cached);
        }

        let content = pipeline::create_access_token(
            raw_token,
            &self.issuers,
            self.parser_limits,
            &self.claim_config,
            &self.mappers,
            Utc::now(),
            &self.counter,
        )
        .await?;

        self.cache_access_token(raw_token, &content);
        Ok(content)
    }

    /// Validate an ID token: like [`create_access_token`](Self::create_access_token)
    /// plus `aud`/`azp` checks against this validator's `expected_client_id`.
    pub async fn create_id_token(&self, raw_token: &str) -> Result<IdTokenContent, TokenValidationError> {
        if let Some(cached) = self.id_cache.get(raw_token) {
            return Ok(cached);
        }

        let content = pipeline::create_id_token(
            raw_token,
            &self.issuers,
            self.parser_limits,
            &self.claim_config,
            &self.mappers,
            &self.expected_client_id,
            Utc::now(),
            &self.counter,
        )
        .await?;

        self.cache_id_token(raw_token, &content);
        Ok(content)
    }

    /// Best-effort refresh token decode. Never fails.
    #[must_use]
    pub fn create_refresh_token(&self, raw_token: &str) -> RefreshTokenContent {
        pipeline::create_refresh_token(raw_token, self.parser_limits)
    }

    /// A snapshot of every security event recorded so far.
    #[must_use]
    pub fn counter_snapshot(&self) -> std::collections::HashMap<(crate::error::SecurityEventCategory, crate::error::ValidationEventType), u64> {
        self.counter.snapshot()
    }

    /// Cancel background JWKS refresh on every issuer.
    pub fn shutdown(&self) {
        for issuer in &self.issuers {
            issuer.shutdown();
        }
    }

    fn cache_access_token(&self, raw_token: &str, content: &AccessTokenContent) {
        if let Some(exp) = content.claims.get("exp").and_then(crate::claims::ClaimValue::as_datetime) {
            self.access_cache.insert(
                raw_token,
                content.clone(),
                exp.timestamp(),
                std::time::Duration::from_secs(10),
            );
        }
    }

    fn cache_id_token(&self, raw_token: &str, content: &IdTokenContent) {
        if let Some(exp) = content.claims.get("exp").and_then(crate::claims::ClaimValue::as_datetime) {
            self.id_cache.insert(
                raw_token,
                content.clone(),
                exp.timestamp(),
                std::time::Duration::from_secs(10),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, IssuerSettings, JwksSourceConfig, ParserSettings, RetrySettings};
    use std::collections::HashMap;

    fn settings_with_inline_issuer() -> ValidatorSettings {
        let mut issuers = HashMap::new();
        issuers.insert(
            "primary".to_string(),
            IssuerSettings {
                enabled: true,
                issuer_identifier: "https://idp.example.com".to_string(),
                expected_client_id: Some("client-1".to_string()),
                expected_audience: None,
                algorithms: vec!["RS256".to_string()],
                claim_sub_optional: false,
                jwks: JwksSourceConfig {
                    inline: Some(
                        serde_json::json!({"keys": [{"kty": "RSA", "alg": "RS256", "kid": "k1", "n": "AQAB", "e": "AQAB"}]})
                            .to_string(),
                    ),
                    ..JwksSourceConfig::default()
                },
                keycloak: Default::default(),
            },
        );
        ValidatorSettings {
            issuers,
            parser: ParserSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
        }
    }

    #[test]
    fn builds_validator_from_settings() {
        let settings = settings_with_inline_issuer();
        let validator = TokenValidator::new(&settings, "client-1").unwrap();
        assert_eq!(validator.issuers.len(), 1);
    }

    #[tokio::test]
    async fn refresh_token_never_fails_even_on_garbage_input() {
        let settings = settings_with_inline_issuer();
        let validator = TokenValidator::new(&settings, "client-1").unwrap();
        let content = validator.create_refresh_token("garbage");
        assert!(content.claims.is_empty());
    }

    #[tokio::test]
    async fn access_token_rejects_unconfigured_issuer() {
        let settings = settings_with_inline_issuer();
        let validator = TokenValidator::new(&settings, "client-1").unwrap();
        validator.init_async().await;

        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let header = URL_SAFE_NO_PAD.encode(serde_json::json!({"alg": "RS256", "kid": "k1"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({"iss": "https://other-idp.example.com", "sub": "u1", "exp": 9_999_999_999i64})
                .to_string(),
        );
        let token = format!("{header}.{payload}.sig");

        let err = validator.create_access_token(&token).await.unwrap_err();
        assert_eq!(err.event_type, crate::error::ValidationEventType::ClaimIssuerNotConfigured);
    }
}
