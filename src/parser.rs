//! Non-validating JWT structure parser (C9).
//!
//! Splits a compact JWT into its three segments, strictly base64url-decodes
//! the header and payload, and parses them as depth- and size-bounded JSON.
//! This stage performs no semantic validation: no signature check, no claim
//! check. It only establishes that the token is well-formed enough to hand to
//! [`crate::signature`] and [`crate::claim_validator`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::error::{TokenValidationError, ValidationEventType};

/// Default ceiling on the raw compact token, in bytes.
pub const DEFAULT_MAX_TOKEN_SIZE_BYTES: usize = 8192;
/// Default ceiling on JSON nesting depth for the header/payload.
pub const DEFAULT_MAX_JSON_DEPTH: usize = 10;
/// Default ceiling on any single JSON string value's length, in bytes.
pub const DEFAULT_MAX_JSON_STRING_BYTES: usize = 8192;

/// Parser limits, configurable per [`crate::config::ParserConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    pub max_token_size_bytes: usize,
    pub max_json_depth: usize,
    pub max_json_string_bytes: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_token_size_bytes: DEFAULT_MAX_TOKEN_SIZE_BYTES,
            max_json_depth: DEFAULT_MAX_JSON_DEPTH,
            max_json_string_bytes: DEFAULT_MAX_JSON_STRING_BYTES,
        }
    }
}

/// A structurally valid, not-yet-verified JWT.
#[derive(Debug, Clone)]
pub struct ParsedJwt {
    /// Decoded JOSE header.
    pub header: Value,
    /// Decoded claims payload.
    pub payload: Value,
    /// The `header.payload` ASCII bytes the signature was computed over.
    pub signing_input: Vec<u8>,
    /// Decoded raw signature bytes (empty for an unsigned/malformed third segment).
    pub signature_bytes: Vec<u8>,
}

/// Parse and structurally validate a compact JWT string.
pub fn parse(token: &str, limits: ParserLimits) -> Result<ParsedJwt, TokenValidationError> {
    if token.len() > limits.max_token_size_bytes {
        return Err(TokenValidationError::new(
            ValidationEventType::TokenStructureTooLarge,
            format!(
                "token is {} bytes, exceeding the {}-byte limit",
                token.len(),
                limits.max_token_size_bytes
            ),
        ));
    }

    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
        return Err(TokenValidationError::new(
            ValidationEventType::TokenStructureMalformed,
            format!("expected 3 dot-separated segments, found {}", segments.len()),
        ));
    };

    if header_b64.is_empty() || payload_b64.is_empty() {
        return Err(TokenValidationError::new(
            ValidationEventType::TokenStructureMalformed,
            "header and payload segments must be non-empty",
        ));
    }

    let header_bytes = decode_segment(header_b64)?;
    let payload_bytes = decode_segment(payload_b64)?;
    let signature_bytes = decode_segment(signature_b64)?;

    let header = parse_bounded_json(&header_bytes, limits)?;
    let payload = parse_bounded_json(&payload_bytes, limits)?;

    let signing_input = format!("{header_b64}.{payload_b64}").into_bytes();

    Ok(ParsedJwt {
        header,
        payload,
        signing_input,
        signature_bytes,
    })
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenValidationError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        TokenValidationError::new(
            ValidationEventType::TokenStructureDecodeError,
            format!("invalid base64url segment: {e}"),
        )
    })
}

fn parse_bounded_json(bytes: &[u8], limits: ParserLimits) -> Result<Value, TokenValidationError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        TokenValidationError::new(
            ValidationEventType::TokenStructureInvalidJson,
            format!("invalid JSON: {e}"),
        )
    })?;

    check_bounds(&value, limits, 0)?;
    Ok(value)
}

fn check_bounds(value: &Value, limits: ParserLimits, depth: usize) -> Result<(), TokenValidationError> {
    if depth > limits.max_json_depth {
        return Err(TokenValidationError::new(
            ValidationEventType::TokenStructureInvalidJson,
            format!("JSON nesting exceeds the {}-level limit", limits.max_json_depth),
        ));
    }

    match value {
        Value::String(s) if s.len() > limits.max_json_string_bytes => Err(TokenValidationError::new(
            ValidationEventType::TokenStructureInvalidJson,
            format!(
                "JSON string of {} bytes exceeds the {}-byte limit",
                s.len(),
                limits.max_json_string_bytes
            ),
        )),
        Value::Array(items) => {
            for item in items {
                check_bounds(item, limits, depth + 1)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for v in map.values() {
                check_bounds(v, limits, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn build_token(header: &Value, payload: &Value, sig: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            encode(header),
            encode(payload),
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    #[test]
    fn parses_well_formed_token() {
        let header = serde_json::json!({"alg": "RS256", "kid": "k1"});
        let payload = serde_json::json!({"sub": "user-1", "exp": 1_700_000_000});
        let token = build_token(&header, &payload, b"sig-bytes");

        let parsed = parse(&token, ParserLimits::default()).unwrap();
        assert_eq!(parsed.header["alg"], "RS256");
        assert_eq!(parsed.payload["sub"], "user-1");
        assert_eq!(parsed.signature_bytes, b"sig-bytes");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = parse("a.b", ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureMalformed);
    }

    #[test]
    fn rejects_empty_header_segment() {
        let err = parse(".eyJ9.sig", ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureMalformed);
    }

    #[test]
    fn rejects_oversized_token() {
        let limits = ParserLimits {
            max_token_size_bytes: 4,
            ..ParserLimits::default()
        };
        let err = parse("aaaaa.bbbbb.ccccc", limits).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureTooLarge);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = parse("not-base64!!!.eyJ9.sig", ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureDecodeError);
    }

    #[test]
    fn rejects_malformed_json() {
        let bad_header = URL_SAFE_NO_PAD.encode(b"not json");
        let payload = serde_json::json!({});
        let token = format!("{}.{}.sig", bad_header, encode(&payload));
        let err = parse(&token, ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureInvalidJson);
    }

    #[test]
    fn rejects_excessive_json_depth() {
        let mut value = serde_json::json!("leaf");
        for _ in 0..20 {
            value = serde_json::json!({"n": value});
        }
        let payload = serde_json::json!({"sub": "x"});
        let token = build_token(&value, &payload, b"sig");
        let err = parse(&token, ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureInvalidJson);
    }

    #[test]
    fn rejects_oversized_json_string() {
        let header = serde_json::json!({"alg": "RS256"});
        let payload = serde_json::json!({"sub": "x".repeat(20_000)});
        let token = build_token(&header, &payload, b"sig");
        let err = parse(&token, ParserLimits::default()).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::TokenStructureInvalidJson);
    }
}
