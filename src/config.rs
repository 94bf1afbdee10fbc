//! Configuration schema (§6): `serde`-deserializable structs mirroring the
//! dotted-key configuration surface (`oauth.issuers.<name>.*`, `parser.*`,
//! `cache.*`, `retry.*`). Every field that has a documented default carries
//! `#[serde(default = ...)]` so a caller can omit anything but the one or two
//! fields that matter for their deployment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DEFAULT_CAPACITY, DEFAULT_EXPIRY_SKEW};
use crate::claim_validator::{ClaimValidatorConfig, DEFAULT_LEEWAY};
use crate::http_handler::HttpHandlerConfig;
use crate::jwks::loader::JwksLoaderConfig;
use crate::jwks::parser::{DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_KEYS};
use crate::parser::{ParserLimits, DEFAULT_MAX_JSON_DEPTH, DEFAULT_MAX_JSON_STRING_BYTES, DEFAULT_MAX_TOKEN_SIZE_BYTES};
use crate::retry::RetryStrategy;

fn default_true() -> bool {
    true
}

fn default_algorithms() -> Vec<String> {
    vec![
        "RS256".to_string(),
        "RS384".to_string(),
        "RS512".to_string(),
        "ES256".to_string(),
        "ES384".to_string(),
        "ES512".to_string(),
        "PS256".to_string(),
        "PS384".to_string(),
        "PS512".to_string(),
    ]
}

fn default_refresh_interval_seconds() -> u64 {
    600
}

/// JWKS source keys under `oauth.issuers.<name>.jwks.*`. Exactly one of
/// `http.url`, `http.well-known-url`, `file-path`, `inline` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksSourceConfig {
    #[serde(rename = "http.url", default)]
    pub http_url: Option<String>,
    #[serde(rename = "http.well-known-url", default)]
    pub http_well_known_url: Option<String>,
    #[serde(rename = "file-path", default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(rename = "refresh-interval-seconds", default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
}

impl Default for JwksSourceConfig {
    fn default() -> Self {
        Self {
            http_url: None,
            http_well_known_url: None,
            file_path: None,
            inline: None,
            refresh_interval_seconds: default_refresh_interval_seconds(),
        }
    }
}

/// Keycloak-specific claim mapper toggles, under `oauth.issuers.<name>.keycloak.mappers.*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeycloakMappersConfig {
    #[serde(rename = "default-roles.enabled", default)]
    pub default_roles_enabled: bool,
    #[serde(rename = "default-groups.enabled", default)]
    pub default_groups_enabled: bool,
}

/// A single `oauth.issuers.<name>.*` configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "issuer-identifier")]
    pub issuer_identifier: String,
    #[serde(rename = "expected-client-id", default)]
    pub expected_client_id: Option<String>,
    #[serde(rename = "expected-audience", default)]
    pub expected_audience: Option<Vec<String>>,
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    #[serde(rename = "claim-sub-optional", default)]
    pub claim_sub_optional: bool,
    pub jwks: JwksSourceConfig,
    #[serde(default)]
    pub keycloak: KeycloakMappersSection,
}

/// Wraps [`KeycloakMappersConfig`] so the dotted prefix `keycloak.mappers.*`
/// deserializes as a nested object rather than flattened fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeycloakMappersSection {
    #[serde(default)]
    pub mappers: KeycloakMappersConfig,
}

/// `parser.*` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSettings {
    #[serde(rename = "max-token-size-bytes", default = "default_max_token_size_bytes")]
    pub max_token_size_bytes: usize,
    #[serde(rename = "leeway-seconds", default = "default_leeway_seconds")]
    pub leeway_seconds: u64,
    #[serde(rename = "validate-expiration", default = "default_true")]
    pub validate_expiration: bool,
    #[serde(rename = "validate-not-before", default = "default_true")]
    pub validate_not_before: bool,
    #[serde(rename = "validate-issued-at", default = "default_true")]
    pub validate_issued_at: bool,
}

fn default_max_token_size_bytes() -> usize {
    DEFAULT_MAX_TOKEN_SIZE_BYTES
}

fn default_leeway_seconds() -> u64 {
    DEFAULT_LEEWAY.as_secs()
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            max_token_size_bytes: default_max_token_size_bytes(),
            leeway_seconds: default_leeway_seconds(),
            validate_expiration: true,
            validate_not_before: true,
            validate_issued_at: true,
        }
    }
}

impl ParserSettings {
    /// Project to the runtime [`ParserLimits`] the token structure parser consumes.
    #[must_use]
    pub fn to_parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_token_size_bytes: self.max_token_size_bytes,
            max_json_depth: DEFAULT_MAX_JSON_DEPTH,
            max_json_string_bytes: DEFAULT_MAX_JSON_STRING_BYTES,
        }
    }

    /// Project to the runtime [`ClaimValidatorConfig`]'s leeway.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway_seconds)
    }
}

/// `cache.*` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
    #[serde(rename = "expiry-skew-seconds", default = "default_cache_expiry_skew_seconds")]
    pub expiry_skew_seconds: u64,
}

fn default_cache_capacity() -> u64 {
    DEFAULT_CAPACITY
}

fn default_cache_expiry_skew_seconds() -> u64 {
    DEFAULT_EXPIRY_SKEW.as_secs()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            expiry_skew_seconds: default_cache_expiry_skew_seconds(),
        }
    }
}

impl CacheSettings {
    #[must_use]
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.capacity,
            expiry_skew: Duration::from_secs(self.expiry_skew_seconds),
        }
    }
}

/// `retry.*` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(rename = "initial-delay-ms", default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(rename = "max-delay-ms", default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
    #[serde(rename = "max-attempts", default = "default_retry_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_initial_delay_ms() -> u64 {
    200
}
fn default_retry_max_delay_ms() -> u64 {
    10_000
}
fn default_retry_multiplier() -> f64 {
    2.0
}
fn default_retry_max_attempts() -> u32 {
    4
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            multiplier: default_retry_multiplier(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn to_retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.max_attempts,
        )
    }
}

/// Root configuration: every issuer plus the shared parser/cache/retry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorSettings {
    pub issuers: std::collections::HashMap<String, IssuerSettings>,
    #[serde(default)]
    pub parser: ParserSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl IssuerSettings {
    /// Project this issuer's `jwks.*` block and `retry`/document limits into a
    /// runtime [`JwksLoaderConfig`].
    #[must_use]
    pub fn to_jwks_loader_config(&self, retry: &RetrySettings) -> JwksLoaderConfig {
        JwksLoaderConfig {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_keys: DEFAULT_MAX_KEYS,
            refresh_interval: Duration::from_secs(self.jwks.refresh_interval_seconds),
            http: HttpHandlerConfig {
                retry: retry.to_retry_strategy(),
                ..HttpHandlerConfig::default()
            },
        }
    }
}
