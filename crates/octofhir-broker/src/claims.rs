//! Claim path extraction over loosely-typed JSON.
//!
//! A claim path is a dot-separated list of object keys, e.g.
//! `realm_access.roles`. Resolution is best-effort: a missing key, or a
//! non-object value in the middle of the path, yields "absent" rather than
//! an error.
//!
//! ```ignore
//! use octofhir_broker::claims::ClaimExtractor;
//! use serde_json::json;
//!
//! let claims = json!({"realm_access": {"roles": ["admin", "viewer"]}});
//! let roles = ClaimExtractor::extract_strings(&claims, "realm_access.roles");
//! assert_eq!(roles, Some(vec!["admin".to_string(), "viewer".to_string()]));
//! ```

use serde_json::Value;

/// Resolves claim paths against a JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimExtractor;

impl ClaimExtractor {
    /// Resolves `path` against `document`.
    ///
    /// Returns `None` if any segment is missing, if an intermediate value is
    /// not an object, or if the path is empty.
    pub fn extract<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
        if path.trim().is_empty() {
            return None;
        }
        path.split('.').try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            _ => None,
        })
    }

    /// Resolves `path` to a single string.
    ///
    /// Only JSON strings qualify; numbers, booleans, null, arrays and objects
    /// are treated as absent. Empty strings are treated as absent.
    pub fn extract_string(document: &Value, path: &str) -> Option<String> {
        match Self::extract(document, path)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Resolves `path` to an identifier such as a username or subject.
    ///
    /// Like [`extract_string`](Self::extract_string), but a final number or
    /// boolean is rendered as a string (`583231`, `true`). Numeric ids are
    /// common in OAuth2 userinfo responses.
    pub fn extract_identifier(document: &Value, path: &str) -> Option<String> {
        match Self::extract(document, path)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(match (n.as_u64(), n.as_i64(), n.as_f64()) {
                (Some(u), _, _) => u.to_string(),
                (None, Some(i), _) => i.to_string(),
                (None, None, Some(f)) => format!("{f:.0}"),
                (None, None, None) => n.to_string(),
            }),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Resolves `path` to an ordered sequence of strings.
    ///
    /// A scalar string is coerced into a single-element sequence. Non-string
    /// array members are skipped. Returns `None` when nothing usable is found.
    pub fn extract_strings(document: &Value, path: &str) -> Option<Vec<String>> {
        match Self::extract(document, path)? {
            Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
            Value::Array(items) => {
                let values: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if values.is_empty() { None } else { Some(values) }
            }
            _ => None,
        }
    }

    /// Resolves `path` to a boolean.
    ///
    /// Accepts JSON booleans and the strings `"true"` / `"false"`, which some
    /// userinfo endpoints emit for `email_verified`.
    pub fn extract_bool(document: &Value, path: &str) -> Option<bool> {
        match Self::extract(document, path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}
