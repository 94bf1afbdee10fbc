//! Claim model and mappers (C8).
//!
//! [`ClaimValue`] is a small tagged union that always retains the original
//! lexical form of a claim alongside its parsed value, so validation failures
//! and audit logs can show exactly what was in the token. [`ClaimMapper`]
//! implementations are pure, deterministic projections from a raw JSON claims
//! object to a [`ClaimValue`].

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A typed, original-form-preserving claim value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// A single string claim (e.g. `sub`, `azp`).
    String {
        /// Original lexical form as it appeared (or would appear) in JSON.
        original: String,
        /// The claim value itself; identical to `original` for this variant.
        value: String,
    },
    /// A claim that projects to a list of strings (e.g. `scope`, `roles`).
    StringList {
        /// Original lexical form: either the JSON array's canonical text or a
        /// space-delimited string, whichever the source used.
        original: String,
        /// The projected, order-preserving member list (sorted for scopes).
        values: Vec<String>,
    },
    /// A Unix-epoch-seconds claim (e.g. `exp`, `iat`, `nbf`).
    DateTime {
        /// Original lexical form of the epoch-seconds number.
        original: String,
        /// Parsed UTC instant.
        value: DateTime<Utc>,
    },
}

impl ClaimValue {
    /// The explicit "empty" string value used when a string claim is missing.
    #[must_use]
    pub fn empty_string() -> Self {
        Self::String {
            original: String::new(),
            value: String::new(),
        }
    }

    /// The explicit "empty" list value used when a list claim is missing.
    #[must_use]
    pub fn empty_list() -> Self {
        Self::StringList {
            original: String::new(),
            values: Vec::new(),
        }
    }

    /// The explicit "empty" datetime value used when a temporal claim is missing.
    #[must_use]
    pub fn empty_datetime() -> Self {
        Self::DateTime {
            original: String::new(),
            #[allow(clippy::unwrap_used)]
            value: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    /// Whether this is one of the explicit "empty" sentinels above.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String { original, .. } | Self::StringList { original, .. } | Self::DateTime { original, .. } => {
                original.is_empty()
            }
        }
    }

    /// The claim as a string slice, if it is a [`ClaimValue::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The claim as a string list, if it is a [`ClaimValue::StringList`].
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList { values, .. } => Some(values),
            _ => None,
        }
    }

    /// The claim as an instant, if it is a [`ClaimValue::DateTime`].
    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Projects a raw JSON claims object to a single [`ClaimValue`].
///
/// Implementations must be pure and deterministic: the same `(object,
/// claim_name)` pair always yields the same [`ClaimValue`].
pub trait ClaimMapper: Send + Sync {
    /// Project `claim_name` out of `object`.
    fn map(&self, object: &Value, claim_name: &str) -> Result<ClaimValue, String>;
}

/// Copies a string claim verbatim.
pub struct IdentityMapper;
impl ClaimMapper for IdentityMapper {
    fn map(&self, object: &Value, claim_name: &str) -> Result<ClaimValue, String> {
        match object.get(claim_name) {
            Some(Value::String(s)) => Ok(ClaimValue::String {
                original: s.clone(),
                value: s.clone(),
            }),
            None | Some(Value::Null) => Ok(ClaimValue::empty_string()),
            Some(other) => Err(format!("claim '{claim_name}' is not a string: {other}")),
        }
    }
}

/// Parses a Unix-epoch-seconds claim (accepts a JSON number or its string form).
pub struct DateTimeMapper;
impl ClaimMapper for DateTimeMapper {
    fn map(&self, object: &Value, claim_name: &str) -> Result<ClaimValue, String> {
        let epoch = match object.get(claim_name) {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| format!("claim '{claim_name}' is not an integer"))?,
            Some(Value::String(s)) => s
                .parse::<i64>()
                .map_err(|_| format!("claim '{claim_name}' is not a valid epoch string"))?,
            None | Some(Value::Null) => return Ok(ClaimValue::empty_datetime()),
            Some(other) => return Err(format!("claim '{claim_name}' is not a timestamp: {other}")),
        };

        let value = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| format!("claim '{claim_name}' epoch out of range"))?;
        Ok(ClaimValue::DateTime {
            original: epoch.to_string(),
            value,
        })
    }
}

/// Projects a JSON array of strings to a [`ClaimValue::StringList`].
pub struct StringListMapper;
impl ClaimMapper for StringListMapper {
    fn map(&self, object: &Value, claim_name: &str) -> Result<ClaimValue, String> {
        match object.get(claim_name) {
            Some(Value::Array(items)) => project_string_array(items, claim_name),
            None | Some(Value::Null) => Ok(ClaimValue::empty_list()),
            Some(other) => Err(format!("claim '{claim_name}' is not an array: {other}")),
        }
    }
}

fn project_string_array(items: &[Value], claim_name: &str) -> Result<ClaimValue, String> {
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => values.push(s.clone()),
            other => return Err(format!("claim '{claim_name}' contains a non-string element: {other}")),
        }
    }
    let original = serde_json::to_string(items).unwrap_or_default();
    Ok(ClaimValue::StringList { original, values })
}

/// OAuth `scope` claim: accepts a space-delimited string or a JSON array,
/// emits a sorted, deduplicated set. Rejects any other JSON type.
pub struct ScopeMapper;
impl ClaimMapper for ScopeMapper {
    fn map(&self, object: &Value, claim_name: &str) -> Result<ClaimValue, String> {
        let mut values: Vec<String> = match object.get(claim_name) {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(format!("scope array contains a non-string element: {other}")),
                })
                .collect::<Result<_, _>>()?,
            None | Some(Value::Null) => return Ok(ClaimValue::empty_list()),
            Some(other) => return Err(format!("claim '{claim_name}' has unsupported scope type: {other}")),
        };
        values.sort();
        values.dedup();
        let original = object
            .get(claim_name)
            .map(|v| v.to_string())
            .unwrap_or_default();
        Ok(ClaimValue::StringList { original, values })
    }
}

/// Keycloak default-roles mapper: reads `realm_access.roles`, exposed as `roles`.
pub struct KeycloakDefaultRolesMapper;
impl ClaimMapper for KeycloakDefaultRolesMapper {
    fn map(&self, object: &Value, _claim_name: &str) -> Result<ClaimValue, String> {
        match object.get("realm_access").and_then(|v| v.get("roles")) {
            Some(Value::Array(items)) => project_string_array(items, "realm_access.roles"),
            None => Ok(ClaimValue::empty_list()),
            Some(other) => Err(format!("realm_access.roles is not an array: {other}")),
        }
    }
}

/// Keycloak default-groups mapper: copies the `groups` claim verbatim.
pub struct KeycloakDefaultGroupsMapper;
impl ClaimMapper for KeycloakDefaultGroupsMapper {
    fn map(&self, object: &Value, _claim_name: &str) -> Result<ClaimValue, String> {
        StringListMapper.map(object, "groups")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_mapper_copies_string() {
        let obj = json!({"sub": "user-1"});
        let value = IdentityMapper.map(&obj, "sub").unwrap();
        assert_eq!(value.as_str(), Some("user-1"));
    }

    #[test]
    fn identity_mapper_missing_claim_is_empty() {
        let obj = json!({});
        let value = IdentityMapper.map(&obj, "sub").unwrap();
        assert!(value.is_empty());
        assert_eq!(value.as_str(), Some(""));
    }

    #[test]
    fn datetime_mapper_parses_epoch_seconds() {
        let obj = json!({"exp": 1_700_000_000});
        let value = DateTimeMapper.map(&obj, "exp").unwrap();
        assert_eq!(value.as_datetime().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn datetime_mapper_idempotent_via_original() {
        let obj = json!({"exp": 1_700_000_000});
        let first = DateTimeMapper.map(&obj, "exp").unwrap();
        let ClaimValue::DateTime { original, .. } = &first else {
            panic!("expected DateTime")
        };
        let roundtrip_obj = json!({"exp": original});
        let second = DateTimeMapper.map(&roundtrip_obj, "exp").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn scope_mapper_parses_space_delimited_string_sorted() {
        let obj = json!({"scope": "write read read"});
        let value = ScopeMapper.map(&obj, "scope").unwrap();
        assert_eq!(value.as_list().unwrap(), &["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn scope_mapper_parses_array() {
        let obj = json!({"scope": ["b", "a"]});
        let value = ScopeMapper.map(&obj, "scope").unwrap();
        assert_eq!(value.as_list().unwrap(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn scope_mapper_rejects_non_string_non_array() {
        let obj = json!({"scope": 42});
        assert!(ScopeMapper.map(&obj, "scope").is_err());
    }

    #[test]
    fn keycloak_roles_mapper_reads_nested_claim() {
        let obj = json!({"realm_access": {"roles": ["admin", "user"]}});
        let value = KeycloakDefaultRolesMapper.map(&obj, "roles").unwrap();
        assert_eq!(value.as_list().unwrap(), &["admin".to_string(), "user".to_string()]);
    }

    #[test]
    fn keycloak_groups_mapper_copies_groups_claim() {
        let obj = json!({"groups": ["/team-a"]});
        let value = KeycloakDefaultGroupsMapper.map(&obj, "groups").unwrap();
        assert_eq!(value.as_list().unwrap(), &["/team-a".to_string()]);
    }

    #[test]
    fn string_list_mapper_is_idempotent() {
        let obj = json!({"aud": ["c1", "c2"]});
        let first = StringListMapper.map(&obj, "aud").unwrap();
        assert_eq!(first.clone(), first);
    }
}
