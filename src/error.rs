//! Error taxonomy for token validation.
//!
//! [`TokenValidationError`] is the only error type that crosses the public API
//! boundary of [`crate::facade::TokenValidator`]. It always carries a
//! [`ValidationEventType`], which doubles as the key under which the failure
//! is recorded in the [security event counter](crate::counter::SecurityEventCounter).

use std::fmt;

/// Top-level category under which a [`ValidationEventType`] is counted.
///
/// Mirrors the category set in the specification: every event type belongs to
/// exactly one category, and categories are what a metrics reporter groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecurityEventCategory {
    /// Malformed, oversized, or otherwise structurally invalid tokens.
    TokenStructure,
    /// Signature verification failures and successes.
    Signature,
    /// Claim-level failures (temporal, audience, missing claims).
    ClaimValidation,
    /// JWKS load/parse/refresh outcomes.
    Jwks,
    /// Access-token cache hits/misses/evictions.
    Cache,
    /// Issuer/loader misconfiguration.
    Configuration,
}

/// Closed enum of every meaningful validation outcome, success and failure.
///
/// New variants are never added silently: the set is the contract between
/// this crate and anything that aggregates [`SecurityEventCounter::snapshot`]
/// into metrics or an audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationEventType {
    // --- token structure ---
    TokenStructureMalformed,
    TokenStructureTooLarge,
    TokenStructureInvalidJson,
    TokenStructureDecodeError,
    TokenStructureSuccess,

    // --- signature ---
    SignatureAlgorithmRejected,
    SignatureAlgorithmNotAllowed,
    SignatureAlgorithmMismatch,
    SignatureMissingKey,
    SignatureInvalid,
    SignatureKeyDecodeError,
    SignatureSuccess,

    // --- claim validation ---
    ClaimMissingClaim,
    ClaimIssuerNotConfigured,
    ClaimExpired,
    ClaimNotYetValid,
    ClaimIssuedAtFuture,
    ClaimAudienceMismatch,
    ClaimAzpMismatch,
    ClaimScopeInvalid,
    ClaimValidationSuccess,

    // --- jwks ---
    JwksLoadFailed,
    JwksParseFailed,
    JwksEmptyKeySet,
    JwksRefreshed,
    JwksRefreshUnchanged,
    JwksKidCollision,
    JwksLoadSuccess,

    // --- cache ---
    CacheHit,
    CacheMiss,
    CacheEviction,
    CacheInsert,
    CacheDisabled,

    // --- configuration ---
    ConfigurationInvalidIssuer,
    ConfigurationMixedJwksSource,
    ConfigurationMissingJwksSource,
    ConfigurationWellKnownIssuerMismatch,
}

impl ValidationEventType {
    /// The category this event type is counted under.
    #[must_use]
    pub fn category(self) -> SecurityEventCategory {
        use SecurityEventCategory::{
            Cache, ClaimValidation, Configuration, Jwks, Signature, TokenStructure,
        };
        match self {
            Self::TokenStructureMalformed
            | Self::TokenStructureTooLarge
            | Self::TokenStructureInvalidJson
            | Self::TokenStructureDecodeError
            | Self::TokenStructureSuccess => TokenStructure,

            Self::SignatureAlgorithmRejected
            | Self::SignatureAlgorithmNotAllowed
            | Self::SignatureAlgorithmMismatch
            | Self::SignatureMissingKey
            | Self::SignatureInvalid
            | Self::SignatureKeyDecodeError
            | Self::SignatureSuccess => Signature,

            Self::ClaimMissingClaim
            | Self::ClaimIssuerNotConfigured
            | Self::ClaimExpired
            | Self::ClaimNotYetValid
            | Self::ClaimIssuedAtFuture
            | Self::ClaimAudienceMismatch
            | Self::ClaimAzpMismatch
            | Self::ClaimScopeInvalid
            | Self::ClaimValidationSuccess => ClaimValidation,

            Self::JwksLoadFailed
            | Self::JwksParseFailed
            | Self::JwksEmptyKeySet
            | Self::JwksRefreshed
            | Self::JwksRefreshUnchanged
            | Self::JwksKidCollision
            | Self::JwksLoadSuccess => Jwks,

            Self::CacheHit
            | Self::CacheMiss
            | Self::CacheEviction
            | Self::CacheInsert
            | Self::CacheDisabled => Cache,

            Self::ConfigurationInvalidIssuer
            | Self::ConfigurationMixedJwksSource
            | Self::ConfigurationMissingJwksSource
            | Self::ConfigurationWellKnownIssuerMismatch => Configuration,
        }
    }
}

impl fmt::Display for ValidationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The single error type returned by [`crate::facade::TokenValidator`]'s
/// `create_access_token`/`create_id_token` operations.
///
/// Carries the closed [`ValidationEventType`] so callers (and the counter)
/// can branch on *why* validation failed without parsing a message string.
#[derive(Debug, thiserror::Error)]
#[error("{event_type}: {message}")]
pub struct TokenValidationError {
    /// Which of the ~40 closed outcomes this failure represents.
    pub event_type: ValidationEventType,
    /// Human-readable detail, safe to log but not guaranteed stable.
    pub message: String,
}

impl TokenValidationError {
    /// Construct a new error, pairing an event type with a message.
    pub fn new(event_type: ValidationEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_type_has_one_category() {
        assert_eq!(
            ValidationEventType::ClaimExpired.category(),
            SecurityEventCategory::ClaimValidation
        );
        assert_eq!(
            ValidationEventType::SignatureInvalid.category(),
            SecurityEventCategory::Signature
        );
        assert_eq!(
            ValidationEventType::JwksLoadFailed.category(),
            SecurityEventCategory::Jwks
        );
    }

    #[test]
    fn display_matches_debug() {
        let err = TokenValidationError::new(ValidationEventType::ClaimExpired, "token expired");
        assert_eq!(format!("{err}"), "ClaimExpired: token expired");
    }
}
