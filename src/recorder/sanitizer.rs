//! Redaction of sensitive step parameters

use serde_json::{Map, Value};

/// Keys redacted by default (matched as case-insensitive substrings).
pub const DEFAULT_SENSITIVE_KEYS: [&str; 4] = ["auth", "token", "password", "cookie"];

/// Default replacement for redacted values.
pub const DEFAULT_PLACEHOLDER: &str = "*****";

/// Recursively redacts values stored under sensitive keys.
///
/// A key is sensitive when it contains one of the configured keys,
/// ignoring case. Scalars under a sensitive key are replaced; mappings and
/// sequences are walked so the structure is preserved.
///
/// # Example
///
/// ```rust
/// use chaos_trials::recorder::Sanitizer;
/// use serde_json::json;
///
/// let cleaned = Sanitizer::default().clean(&json!({"c": {"a_token": "secret"}, "app": "web"}));
/// assert_eq!(cleaned, json!({"c": {"a_token": "*****"}, "app": "web"}));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitizer {
    sensitive_keys: Vec<String>,
    placeholder: String,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_KEYS, DEFAULT_PLACEHOLDER)
    }
}

impl Sanitizer {
    /// Create a sanitizer with custom keys and placeholder.
    #[must_use]
    pub fn new<I, S>(sensitive_keys: I, placeholder: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sensitive_keys: sensitive_keys
                .into_iter()
                .map(|key| key.as_ref().to_lowercase())
                .collect(),
            placeholder: placeholder.into(),
        }
    }

    /// Whether values under `key` are redacted.
    #[must_use]
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_keys
            .iter()
            .any(|sensitive| key.contains(sensitive.as_str()))
    }

    /// Redacted copy of `value`.
    #[must_use]
    pub fn clean(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.clean_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.clean(item)).collect()),
            other => other.clone(),
        }
    }

    /// Redacted copy of a mapping.
    #[must_use]
    pub fn clean_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let cleaned = match value {
                    Value::Object(_) | Value::Array(_) => self.clean(value),
                    _ if self.is_sensitive(key) => Value::String(self.placeholder.clone()),
                    scalar => scalar.clone(),
                };
                (key.clone(), cleaned)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_redaction() {
        let sanitizer = Sanitizer::default();
        let cleaned = sanitizer.clean(&json!({
            "url": "http://x.test",
            "headers": {"Authorization": "Bearer abc", "Accept": "*/*"},
            "items": [{"password": "p"}, "plain", ["nested"]]
        }));
        assert_eq!(
            cleaned,
            json!({
                "url": "http://x.test",
                "headers": {"Authorization": "*****", "Accept": "*/*"},
                "items": [{"password": "*****"}, "plain", ["nested"]]
            })
        );
    }

    #[test]
    fn test_case_insensitive_substring() {
        let sanitizer = Sanitizer::default();
        assert!(sanitizer.is_sensitive("X-Auth-Header"));
        assert!(sanitizer.is_sensitive("SESSION_COOKIE"));
        assert!(sanitizer.is_sensitive("access_TOKEN"));
        assert!(!sanitizer.is_sensitive("app_name"));
    }

    #[test]
    fn test_sensitive_container_is_walked() {
        let sanitizer = Sanitizer::default();
        let cleaned = sanitizer.clean(&json!({"auth": {"user": "u", "type": "basic"}}));
        assert_eq!(cleaned, json!({"auth": {"user": "u", "type": "basic"}}));
    }

    #[test]
    fn test_non_string_scalars_under_sensitive_key() {
        let sanitizer = Sanitizer::default();
        let cleaned = sanitizer.clean(&json!({"token_ttl": 3600, "token": null}));
        assert_eq!(cleaned, json!({"token_ttl": "*****", "token": "*****"}));
    }

    #[test]
    fn test_custom_keys_and_placeholder() {
        let sanitizer = Sanitizer::new(["Secret"], "[redacted]");
        let cleaned = sanitizer.clean(&json!({"client_secret": "s", "token": "t"}));
        assert_eq!(cleaned, json!({"client_secret": "[redacted]", "token": "t"}));
    }

    #[test]
    fn test_scalar_input_passes_through() {
        assert_eq!(Sanitizer::default().clean(&json!("token")), json!("token"));
    }
}
