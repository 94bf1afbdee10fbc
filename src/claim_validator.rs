//! Claim validation (C12): mandatory-claim presence, temporal checks,
//! audience/azp checks, and custom claim projection via [`crate::claims::ClaimMapper`].
//!
//! Every failure increments its own [`ValidationEventType`] so callers can
//! tell, from the counter alone, which check is failing in production without
//! parsing error messages.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::claims::{ClaimMapper, ClaimValue};
use crate::error::{TokenValidationError, ValidationEventType};

/// Default leeway applied to `exp`/`nbf`/`iat` checks, absorbing clock skew
/// between the issuer and this process.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);

/// Tunables for [`validate_temporal`] and [`validate_mandatory_claims`].
#[derive(Debug, Clone)]
pub struct ClaimValidatorConfig {
    pub leeway: Duration,
    pub required_claims: Vec<String>,
    /// Whether `exp` is enforced. A collaborator may disable this for tokens
    /// it re-validates through another path.
    pub validate_expiration: bool,
    pub validate_not_before: bool,
    pub validate_issued_at: bool,
}

impl Default for ClaimValidatorConfig {
    fn default() -> Self {
        Self {
            leeway: DEFAULT_LEEWAY,
            required_claims: vec!["sub".to_string(), "iss".to_string(), "exp".to_string()],
            validate_expiration: true,
            validate_not_before: true,
            validate_issued_at: true,
        }
    }
}

/// Reject the token unless every claim in `required` is present and non-null.
pub fn validate_mandatory_claims(payload: &Value, required: &[String]) -> Result<(), TokenValidationError> {
    for claim in required {
        match payload.get(claim) {
            Some(Value::Null) | None => {
                return Err(TokenValidationError::new(
                    ValidationEventType::ClaimMissingClaim,
                    format!("required claim '{claim}' is missing"),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn epoch_claim(payload: &Value, name: &str) -> Option<i64> {
    payload.get(name).and_then(Value::as_i64)
}

/// Check `exp`/`nbf`/`iat` against `now`, allowing `config.leeway` of clock skew.
/// Claims that are absent are not checked; presence is `validate_mandatory_claims`'s
/// job. Each of the three checks can be turned off independently via
/// `config.validate_expiration`/`validate_not_before`/`validate_issued_at`.
pub fn validate_temporal(
    payload: &Value,
    now: DateTime<Utc>,
    config: &ClaimValidatorConfig,
) -> Result<(), TokenValidationError> {
    let leeway_secs = i64::try_from(config.leeway.as_secs()).unwrap_or(i64::MAX);
    let now_epoch = now.timestamp();

    if config.validate_expiration {
        if let Some(exp) = epoch_claim(payload, "exp") {
            if now_epoch > exp + leeway_secs {
                return Err(TokenValidationError::new(
                    ValidationEventType::ClaimExpired,
                    format!("token expired at {exp}, now is {now_epoch}"),
                ));
            }
        }
    }

    if config.validate_not_before {
        if let Some(nbf) = epoch_claim(payload, "nbf") {
            if now_epoch < nbf - leeway_secs {
                return Err(TokenValidationError::new(
                    ValidationEventType::ClaimNotYetValid,
                    format!("token not valid until {nbf}, now is {now_epoch}"),
                ));
            }
        }
    }

    if config.validate_issued_at {
        if let Some(iat) = epoch_claim(payload, "iat") {
            if iat > now_epoch + leeway_secs {
                return Err(TokenValidationError::new(
                    ValidationEventType::ClaimIssuedAtFuture,
                    format!("token issued at {iat} is in the future, now is {now_epoch}"),
                ));
            }
        }
    }

    Ok(())
}

fn aud_contains(payload: &Value, expected: &str) -> bool {
    match payload.get("aud") {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(expected)),
        _ => false,
    }
}

/// Check that `aud` contains `expected_audience` (string or array form, per RFC 7519 §4.1.3).
pub fn validate_audience(payload: &Value, expected_audience: &str) -> Result<(), TokenValidationError> {
    if aud_contains(payload, expected_audience) {
        Ok(())
    } else {
        Err(TokenValidationError::new(
            ValidationEventType::ClaimAudienceMismatch,
            format!("'aud' does not contain expected audience '{expected_audience}'"),
        ))
    }
}

/// ID-token-specific check: `azp` (when present) must equal `expected_client_id`.
/// Per the OIDC core spec, `azp` is only required when `aud` has multiple values,
/// but this crate checks it whenever it is present.
pub fn validate_azp(payload: &Value, expected_client_id: &str) -> Result<(), TokenValidationError> {
    match payload.get("azp") {
        Some(Value::String(azp)) if azp == expected_client_id => Ok(()),
        Some(Value::String(azp)) => Err(TokenValidationError::new(
            ValidationEventType::ClaimAzpMismatch,
            format!("'azp' claim '{azp}' does not match expected client id '{expected_client_id}'"),
        )),
        _ => Ok(()),
    }
}

/// Project a set of named [`ClaimMapper`]s over the payload.
pub fn apply_mappers(
    payload: &Value,
    mappers: &[(String, Box<dyn ClaimMapper>)],
) -> Result<HashMap<String, ClaimValue>, TokenValidationError> {
    let mut projected = HashMap::with_capacity(mappers.len());
    for (claim_name, mapper) in mappers {
        let value = mapper.map(payload, claim_name).map_err(|e| {
            TokenValidationError::new(
                ValidationEventType::ClaimScopeInvalid,
                format!("failed to project claim '{claim_name}': {e}"),
            )
        })?;
        projected.insert(claim_name.clone(), value);
    }
    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::IdentityMapper;
    use serde_json::json;

    #[test]
    fn mandatory_claims_pass_when_all_present() {
        let payload = json!({"sub": "u1", "iss": "https://idp", "exp": 1});
        assert!(validate_mandatory_claims(&payload, &["sub".to_string(), "iss".to_string()]).is_ok());
    }

    #[test]
    fn mandatory_claims_fail_on_missing() {
        let payload = json!({"sub": "u1"});
        let err = validate_mandatory_claims(&payload, &["iss".to_string()]).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimMissingClaim);
    }

    fn config_with_leeway(leeway: Duration) -> ClaimValidatorConfig {
        ClaimValidatorConfig { leeway, ..ClaimValidatorConfig::default() }
    }

    #[test]
    fn temporal_rejects_expired_token_outside_leeway() {
        let now = DateTime::<Utc>::from_timestamp(1000, 0).unwrap();
        let payload = json!({"exp": 900});
        let err = validate_temporal(&payload, now, &config_with_leeway(Duration::from_secs(30))).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimExpired);
    }

    #[test]
    fn temporal_accepts_expiry_within_leeway() {
        let now = DateTime::<Utc>::from_timestamp(920, 0).unwrap();
        let payload = json!({"exp": 900});
        assert!(validate_temporal(&payload, now, &config_with_leeway(Duration::from_secs(30))).is_ok());
    }

    #[test]
    fn temporal_rejects_not_yet_valid() {
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let payload = json!({"nbf": 200});
        let err = validate_temporal(&payload, now, &config_with_leeway(Duration::from_secs(10))).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimNotYetValid);
    }

    #[test]
    fn temporal_rejects_issued_at_future() {
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let payload = json!({"iat": 500});
        let err = validate_temporal(&payload, now, &config_with_leeway(Duration::from_secs(10))).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimIssuedAtFuture);
    }

    #[test]
    fn temporal_skips_expiration_check_when_disabled() {
        let now = DateTime::<Utc>::from_timestamp(1000, 0).unwrap();
        let payload = json!({"exp": 900});
        let config = ClaimValidatorConfig {
            validate_expiration: false,
            ..config_with_leeway(Duration::from_secs(30))
        };
        assert!(validate_temporal(&payload, now, &config).is_ok());
    }

    #[test]
    fn temporal_skips_not_before_check_when_disabled() {
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let payload = json!({"nbf": 200});
        let config = ClaimValidatorConfig {
            validate_not_before: false,
            ..config_with_leeway(Duration::from_secs(10))
        };
        assert!(validate_temporal(&payload, now, &config).is_ok());
    }

    #[test]
    fn temporal_skips_issued_at_check_when_disabled() {
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let payload = json!({"iat": 500});
        let config = ClaimValidatorConfig {
            validate_issued_at: false,
            ..config_with_leeway(Duration::from_secs(10))
        };
        assert!(validate_temporal(&payload, now, &config).is_ok());
    }

    #[test]
    fn audience_matches_string_form() {
        let payload = json!({"aud": "client-1"});
        assert!(validate_audience(&payload, "client-1").is_ok());
    }

    #[test]
    fn audience_matches_array_form() {
        let payload = json!({"aud": ["client-1", "client-2"]});
        assert!(validate_audience(&payload, "client-2").is_ok());
    }

    #[test]
    fn audience_rejects_mismatch() {
        let payload = json!({"aud": "client-1"});
        let err = validate_audience(&payload, "client-2").unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimAudienceMismatch);
    }

    #[test]
    fn azp_absent_is_not_an_error() {
        let payload = json!({});
        assert!(validate_azp(&payload, "client-1").is_ok());
    }

    #[test]
    fn azp_mismatch_is_rejected() {
        let payload = json!({"azp": "other-client"});
        let err = validate_azp(&payload, "client-1").unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::ClaimAzpMismatch);
    }

    #[test]
    fn apply_mappers_projects_requested_claims() {
        let payload = json!({"sub": "user-1"});
        let mappers: Vec<(String, Box<dyn ClaimMapper>)> = vec![("sub".to_string(), Box::new(IdentityMapper))];
        let projected = apply_mappers(&payload, &mappers).unwrap();
        assert_eq!(projected["sub"].as_str(), Some("user-1"));
    }
}
