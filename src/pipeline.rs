//! Token content pipelines (C13): the three public validation flows, each
//! composing [`crate::parser`], [`crate::issuer`], [`crate::signature`], and
//! [`crate::claim_validator`] in order and projecting the result through the
//! caller's [`ClaimMapper`]s.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::claim_validator::{self, ClaimValidatorConfig};
use crate::claims::{ClaimMapper, ClaimValue};
use crate::counter::SecurityEventCounter;
use crate::error::{TokenValidationError, ValidationEventType};
use crate::issuer::{self, IssuerConfig};
use crate::parser::{self, ParserLimits};
use crate::signature;

/// Validated access token content: identity, issuer, and projected claims.
#[derive(Debug, Clone)]
pub struct AccessTokenContent {
    pub issuer: String,
    pub subject: String,
    pub claims: HashMap<String, ClaimValue>,
    pub raw: String,
}

/// Validated ID token content: like [`AccessTokenContent`] plus the checked audience.
#[derive(Debug, Clone)]
pub struct IdTokenContent {
    pub issuer: String,
    pub subject: String,
    pub audience: String,
    pub claims: HashMap<String, ClaimValue>,
    pub raw: String,
}

/// Best-effort refresh token content. Construction never fails: a structurally
/// invalid refresh token yields an empty claim map rather than an error,
/// since refresh tokens are opaque to most issuers and this crate only
/// extracts what it can.
#[derive(Debug, Clone)]
pub struct RefreshTokenContent {
    pub claims: HashMap<String, ClaimValue>,
    pub raw: String,
}

fn extract_kid(header: &serde_json::Value) -> Option<&str> {
    header.get("kid").and_then(serde_json::Value::as_str)
}

fn extract_alg(header: &serde_json::Value) -> Result<crate::jwks::parser::KeyAlgorithm, TokenValidationError> {
    let alg = header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TokenValidationError::new(ValidationEventType::TokenStructureMalformed, "header has no 'alg'"))?;
    crate::jwks::parser::KeyAlgorithm::parse(alg)
        .map_err(|e| TokenValidationError::new(ValidationEventType::SignatureAlgorithmRejected, e.to_string()))
}

async fn resolve_and_verify(
    raw_token: &str,
    issuers: &[IssuerConfig],
    parser_limits: ParserLimits,
    counter: &SecurityEventCounter,
) -> Result<(serde_json::Value, String), TokenValidationError> {
    let parsed = parser::parse(raw_token, parser_limits).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    counter.increment(ValidationEventType::TokenStructureSuccess);

    let iss_claim = parsed.payload.get("iss").and_then(serde_json::Value::as_str);
    let issuer_cfg = issuer::resolve(issuers, iss_claim).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    let header_alg = extract_alg(&parsed.header).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    if !issuer_cfg.algorithms.is_empty() && !issuer_cfg.algorithms.contains(&header_alg) {
        let err = TokenValidationError::new(
            ValidationEventType::SignatureAlgorithmNotAllowed,
            format!(
                "issuer '{}' does not permit algorithm {header_alg:?}",
                issuer_cfg.issuer
            ),
        );
        counter.increment(err.event_type);
        return Err(err);
    }

    let kid = extract_kid(&parsed.header);
    let key = issuer_cfg.loader.get_key(kid).await.ok_or_else(|| {
        let err = TokenValidationError::new(
            ValidationEventType::SignatureMissingKey,
            format!("no key found for kid {kid:?} under issuer '{}'", issuer_cfg.issuer),
        );
        counter.increment(err.event_type);
        err
    })?;

    signature::verify(&parsed.signing_input, &parsed.signature_bytes, header_alg, &key).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    counter.increment(ValidationEventType::SignatureSuccess);

    Ok((parsed.payload, issuer_cfg.issuer.clone()))
}

fn require_string_claim(payload: &serde_json::Value, name: &str) -> Result<String, TokenValidationError> {
    payload
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TokenValidationError::new(ValidationEventType::ClaimMissingClaim, format!("missing '{name}' claim")))
}

/// Full access-token validation: structure, issuer resolution, signature,
/// mandatory claims, temporal checks, then claim projection.
pub async fn create_access_token(
    raw_token: &str,
    issuers: &[IssuerConfig],
    parser_limits: ParserLimits,
    claim_config: &ClaimValidatorConfig,
    mappers: &[(String, Box<dyn ClaimMapper>)],
    now: DateTime<Utc>,
    counter: &SecurityEventCounter,
) -> Result<AccessTokenContent, TokenValidationError> {
    let (payload, issuer) = resolve_and_verify(raw_token, issuers, parser_limits, counter).await?;

    claim_validator::validate_mandatory_claims(&payload, &claim_config.required_claims).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    claim_validator::validate_temporal(&payload, now, claim_config).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    let subject = require_string_claim(&payload, "sub").map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    let claims = claim_validator::apply_mappers(&payload, mappers).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    counter.increment(ValidationEventType::ClaimValidationSuccess);

    Ok(AccessTokenContent {
        issuer,
        subject,
        claims,
        raw: raw_token.to_string(),
    })
}

/// Full ID-token validation: like [`create_access_token`] plus `aud`/`azp` checks.
pub async fn create_id_token(
    raw_token: &str,
    issuers: &[IssuerConfig],
    parser_limits: ParserLimits,
    claim_config: &ClaimValidatorConfig,
    mappers: &[(String, Box<dyn ClaimMapper>)],
    expected_audience: &str,
    now: DateTime<Utc>,
    counter: &SecurityEventCounter,
) -> Result<IdTokenContent, TokenValidationError> {
    let (payload, issuer) = resolve_and_verify(raw_token, issuers, parser_limits, counter).await?;

    claim_validator::validate_mandatory_claims(&payload, &claim_config.required_claims).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    claim_validator::validate_temporal(&payload, now, claim_config).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    claim_validator::validate_audience(&payload, expected_audience).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    claim_validator::validate_azp(&payload, expected_audience).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    let subject = require_string_claim(&payload, "sub").map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;

    let claims = claim_validator::apply_mappers(&payload, mappers).map_err(|e| {
        counter.increment(e.event_type);
        e
    })?;
    counter.increment(ValidationEventType::ClaimValidationSuccess);

    Ok(IdTokenContent {
        issuer,
        subject,
        audience: expected_audience.to_string(),
        claims,
        raw: raw_token.to_string(),
    })
}

/// Best-effort refresh token decode: structure only, never validated against
/// an issuer or signature, never fails. A malformed refresh token yields an
/// empty claim map so callers can still forward the raw token opaquely.
pub fn create_refresh_token(raw_token: &str, parser_limits: ParserLimits) -> RefreshTokenContent {
    let claims = parser::parse(raw_token, parser_limits)
        .ok()
        .and_then(|parsed| parsed.payload.as_object().cloned())
        .map(|object| {
            object
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, ClaimValue::String { original: s.to_string(), value: s.to_string() })))
                .collect()
        })
        .unwrap_or_default();

    RefreshTokenContent {
        claims,
        raw: raw_token.to_string(),
    }
}
