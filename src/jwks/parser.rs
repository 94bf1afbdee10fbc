//! JWKS parser (C5): turns a JSON Web Key Set document into key-info records
//! indexed by `kid`.
//!
//! Generalizes the reference crate's `JWK`/`JWKS` structs, which only ever
//! decoded an RSA modulus/exponent pair, into the full RS*/PS*/ES* safelist,
//! using `openssl` to build real public keys instead of deferring that to
//! signature-verification time.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Rsa;
use serde::Deserialize;
use tracing::warn;

/// Maximum number of keys accepted from a single JWKS document.
pub const DEFAULT_MAX_KEYS: usize = 50;
/// Maximum JWKS document size, in bytes.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 64 * 1024;

/// Sentinel `kid` used to index a key that has no `kid` of its own.
pub const NO_KID_SENTINEL: &str = "\0__no_kid__";

/// Signature algorithm safelist. `alg=none` and anything outside this set is
/// rejected categorically; there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    Es256,
    Es384,
    Es512,
}

impl KeyAlgorithm {
    /// Parse a JOSE `alg` string, rejecting anything outside the safelist.
    pub fn parse(alg: &str) -> Result<Self, JwksParseError> {
        Ok(match alg {
            "RS256" => Self::Rs256,
            "RS384" => Self::Rs384,
            "RS512" => Self::Rs512,
            "PS256" => Self::Ps256,
            "PS384" => Self::Ps384,
            "PS512" => Self::Ps512,
            "ES256" => Self::Es256,
            "ES384" => Self::Es384,
            "ES512" => Self::Es512,
            "none" => return Err(JwksParseError::AlgorithmNoneRejected),
            other => return Err(JwksParseError::UnsupportedAlgorithm(other.to_string())),
        })
    }

    /// Whether this algorithm is backed by an RSA key.
    #[must_use]
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Rs256 | Self::Rs384 | Self::Rs512 | Self::Ps256 | Self::Ps384 | Self::Ps512
        )
    }

    /// Whether this algorithm is backed by an EC key.
    #[must_use]
    pub fn is_ec(self) -> bool {
        matches!(self, Self::Es256 | Self::Es384 | Self::Es512)
    }

    fn default_for_curve(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(Self::Es256),
            "P-384" => Some(Self::Es384),
            "P-521" => Some(Self::Es512),
            _ => None,
        }
    }
}

/// A single verified-usable public key, resolved from a JWKS entry.
pub struct KeyInfo {
    /// Key ID, or [`NO_KID_SENTINEL`] if the JWK had none.
    pub kid: String,
    /// Algorithm this key is declared to be used with.
    pub algorithm: KeyAlgorithm,
    /// Public key material, ready for signature verification.
    pub public_key: PKey<Public>,
    /// Optional validity window start (`nbf`-style), rarely present in JWKS.
    pub not_before: Option<i64>,
    /// Optional validity window end, rarely present in JWKS.
    pub not_after: Option<i64>,
}

impl Clone for KeyInfo {
    fn clone(&self) -> Self {
        Self {
            kid: self.kid.clone(),
            algorithm: self.algorithm,
            public_key: self.public_key.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
        }
    }
}

/// Failures that can occur while parsing a JWKS document.
#[derive(Debug, thiserror::Error)]
pub enum JwksParseError {
    #[error("document exceeds maximum size")]
    DocumentTooLarge,
    #[error("document contains more than the maximum allowed number of keys")]
    TooManyKeys,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("key has unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("alg=none is rejected")]
    AlgorithmNoneRejected,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid base64url key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("openssl error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("JWKS document contains zero keys")]
    EmptyKeySet,
}

#[derive(Deserialize)]
struct JwkDocument {
    keys: Vec<RawJwk>,
}

#[derive(Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
    // RSA
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    // EC
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

fn decode_b64(field: &str) -> Result<Vec<u8>, JwksParseError> {
    URL_SAFE_NO_PAD
        .decode(field)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(field))
        .map_err(|e| JwksParseError::InvalidKeyMaterial(e.to_string()))
}

fn rsa_public_key(raw: &RawJwk) -> Result<PKey<Public>, JwksParseError> {
    let n = raw.n.as_deref().ok_or_else(|| {
        JwksParseError::InvalidKeyMaterial("RSA key missing 'n'".to_string())
    })?;
    let e = raw.e.as_deref().ok_or_else(|| {
        JwksParseError::InvalidKeyMaterial("RSA key missing 'e'".to_string())
    })?;

    let n = BigNum::from_slice(&decode_b64(n)?)?;
    let e = BigNum::from_slice(&decode_b64(e)?)?;
    let rsa = Rsa::from_public_components(n, e)?;
    Ok(PKey::from_rsa(rsa)?)
}

fn ec_public_key(raw: &RawJwk) -> Result<PKey<Public>, JwksParseError> {
    let crv = raw
        .crv
        .as_deref()
        .ok_or_else(|| JwksParseError::InvalidKeyMaterial("EC key missing 'crv'".to_string()))?;
    let x = raw
        .x
        .as_deref()
        .ok_or_else(|| JwksParseError::InvalidKeyMaterial("EC key missing 'x'".to_string()))?;
    let y = raw
        .y
        .as_deref()
        .ok_or_else(|| JwksParseError::InvalidKeyMaterial("EC key missing 'y'".to_string()))?;

    let nid = match crv {
        "P-256" => Nid::X9_62_PRIME256V1,
        "P-384" => Nid::SECP384R1,
        "P-521" => Nid::SECP521R1,
        other => {
            return Err(JwksParseError::InvalidKeyMaterial(format!(
                "unsupported curve {other}"
            )))
        }
    };

    let group = EcGroup::from_curve_name(nid)?;
    let x = BigNum::from_slice(&decode_b64(x)?)?;
    let y = BigNum::from_slice(&decode_b64(y)?)?;
    let ec_key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
    Ok(PKey::from_ec_key(ec_key)?)
}

/// A parsed JWKS document: the resolved key-info records plus the number of
/// `kid` collisions encountered while indexing them.
pub struct ParsedJwks {
    pub keys: HashMap<String, KeyInfo>,
    pub kid_collisions: usize,
}

/// Parse a JWKS document into key-info records indexed by `kid`.
///
/// Enforces [`DEFAULT_MAX_DOCUMENT_BYTES`]/[`DEFAULT_MAX_KEYS`]. Keys lacking
/// a `kid` are indexed under [`NO_KID_SENTINEL`]; a `kid` collision keeps the
/// last entry, matching the spec's stated resolution, and is reported via
/// [`ParsedJwks::kid_collisions`] for the caller to count.
pub fn parse(bytes: &[u8]) -> Result<ParsedJwks, JwksParseError> {
    parse_with_limits(bytes, DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_KEYS)
}

/// Same as [`parse`] but with explicit size/count limits, for tests and
/// callers with non-default configuration.
pub fn parse_with_limits(
    bytes: &[u8],
    max_document_bytes: usize,
    max_keys: usize,
) -> Result<ParsedJwks, JwksParseError> {
    if bytes.len() > max_document_bytes {
        return Err(JwksParseError::DocumentTooLarge);
    }

    let document: JwkDocument = serde_json::from_slice(bytes)?;
    if document.keys.len() > max_keys {
        return Err(JwksParseError::TooManyKeys);
    }

    let mut result = HashMap::with_capacity(document.keys.len());
    let mut kid_collisions = 0;
    for raw in &document.keys {
        let public_key = match raw.kty.as_str() {
            "RSA" => rsa_public_key(raw)?,
            "EC" => ec_public_key(raw)?,
            other => return Err(JwksParseError::UnsupportedKeyType(other.to_string())),
        };

        let algorithm = match &raw.alg {
            Some(alg) => KeyAlgorithm::parse(alg)?,
            None => {
                if raw.kty == "EC" {
                    raw.crv
                        .as_deref()
                        .and_then(KeyAlgorithm::default_for_curve)
                        .ok_or_else(|| {
                            JwksParseError::UnsupportedAlgorithm(
                                "EC key missing alg and unrecognized crv".to_string(),
                            )
                        })?
                } else {
                    KeyAlgorithm::Rs256
                }
            }
        };

        let kid = raw.kid.clone().unwrap_or_else(|| NO_KID_SENTINEL.to_string());
        if result.contains_key(&kid) {
            warn!(kid = %kid, "JWKS document has duplicate kid, keeping the last entry");
            kid_collisions += 1;
        }
        result.insert(
            kid.clone(),
            KeyInfo {
                kid,
                algorithm,
                public_key,
                not_before: None,
                not_after: None,
            },
        );
    }

    if result.is_empty() {
        return Err(JwksParseError::EmptyKeySet);
    }

    Ok(ParsedJwks { keys: result, kid_collisions })
}
