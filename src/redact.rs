//! Pattern-based sensitive-data masking
//!
//! The redactor takes a value of any shape and returns a structurally
//! identical value with sensitive substrings masked. It operates on strings;
//! mapping values are recursed into (keys are left alone) and sequences are
//! recursed element-wise. Redaction is idempotent and never fails: anything
//! unexpected logs at debug level and the input passes through unmasked.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A compiled masking rule
#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    replacement: String,
}

/// Built-in rules, compiled once. Key-value rules preserve the key prefix;
/// card and SSN masks contain no digits so a second pass is a no-op.
static BUILTIN_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let sources = [
        (r#"(?i)\b(?P<key>password|api[_-]?key|token|secret)\s*=\s*[^\s,"']+"#, "${key}=****"),
        (r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b", "****-****-****-****"),
        (r"\b\d{3}-\d{2}-\d{4}\b", "***-**-****"),
    ];
    sources
        .iter()
        .map(|(pattern, replacement)| Rule {
            // Patterns are literals vetted by the builtin tests below.
            pattern: Regex::new(pattern).expect("builtin redaction pattern"),
            replacement: (*replacement).to_string(),
        })
        .collect()
});

/// Structure-preserving sensitive-data masker
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// User rules, applied before the built-ins
    user_rules: Vec<Rule>,
}

impl Redactor {
    /// Create a redactor with the built-in rule set only
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user pattern, applied before the built-ins.
    ///
    /// Invalid patterns are rejected here so that `redact` itself can never
    /// fail.
    pub fn add_pattern(
        &mut self,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> crate::Result<()> {
        let pattern = Regex::new(pattern)
            .map_err(|e| crate::MysticError::config(format!("Invalid redaction pattern: {e}")))?;
        self.user_rules.push(Rule { pattern, replacement: replacement.into() });
        Ok(())
    }

    /// Builder form of [`add_pattern`](Self::add_pattern)
    pub fn with_pattern(mut self, pattern: &str, replacement: impl Into<String>) -> crate::Result<Self> {
        self.add_pattern(pattern, replacement)?;
        Ok(self)
    }

    /// Mask sensitive substrings in a string
    pub fn redact_str(&self, input: &str) -> String {
        let mut output = input.to_string();
        for rule in self.user_rules.iter().chain(BUILTIN_RULES.iter()) {
            match rule.pattern.replace_all(&output, rule.replacement.as_str()) {
                std::borrow::Cow::Borrowed(_) => {}
                std::borrow::Cow::Owned(masked) => output = masked,
            }
        }
        output
    }

    /// Mask sensitive substrings everywhere in a JSON value, preserving its
    /// shape. Object keys are not rewritten.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_str(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), self.redact_value(v))).collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_password_mask_preserves_key() {
        let r = Redactor::new();
        assert_eq!(r.redact_str("password=hunter2 user=alice"), "password=**** user=alice");
        assert_eq!(r.redact_str("API_KEY=abc123,next"), "API_KEY=****,next");
        assert_eq!(r.redact_str("token = xyz"), "token=****");
    }

    #[test]
    fn test_card_and_ssn_masks() {
        let r = Redactor::new();
        assert_eq!(r.redact_str("card 4111 1111 1111 1111 ok"), "card ****-****-****-**** ok");
        assert_eq!(r.redact_str("ssn 123-45-6789"), "ssn ***-**-****");
    }

    #[test]
    fn test_idempotence() {
        let r = Redactor::new();
        let inputs = [
            "password=hunter2",
            "secret=deep token=t1 4111111111111111",
            "nothing sensitive here",
            "123-45-6789",
        ];
        for input in inputs {
            let once = r.redact_str(input);
            assert_eq!(r.redact_str(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_identity_on_clean_input() {
        let r = Redactor::new();
        let clean = json!({"user": "alice", "count": 3, "tags": ["a", "b"]});
        assert_eq!(r.redact_value(&clean), clean);
    }

    #[test]
    fn test_value_recursion_preserves_shape() {
        let r = Redactor::new();
        let input = json!({
            "creds": {"line": "password=hunter2"},
            "history": ["token=abc", 42, null],
            "password": "plain-key-untouched"
        });
        let masked = r.redact_value(&input);
        assert_eq!(masked["creds"]["line"], "password=****");
        assert_eq!(masked["history"][0], "token=****");
        assert_eq!(masked["history"][1], 42);
        // Keys are not rewritten; bare values without a key=value shape pass.
        assert_eq!(masked["password"], "plain-key-untouched");
    }

    #[test]
    fn test_user_pattern_applies_before_builtin() {
        let r = Redactor::new().with_pattern(r"hunter\d", "[redacted]").unwrap();
        assert_eq!(r.redact_str("password=hunter2"), "password=****");
        assert_eq!(r.redact_str("pw hunter2"), "pw [redacted]");
    }

    #[test]
    fn test_invalid_user_pattern_rejected() {
        let mut r = Redactor::new();
        assert!(r.add_pattern("(unclosed", "x").is_err());
    }
}
