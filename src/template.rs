//! Parameter Substitution Engine
//!
//! Configuration values may embed positional placeholder tokens of the form
//! `{{0}}`, `{{1}}`, ... which are filled from the capture groups produced
//! when a configuration's identifier pattern matched a logical database name.
//!
//! Substitution is a pure function: it walks a [`TemplateValue`] and returns
//! a new value with every placeholder replaced. The stored template is never
//! mutated, so a configuration can be resolved repeatedly with different
//! arguments.
//!
//! # Rules
//! - Strings: every `{{i}}` token is replaced by `args[i]`; an index with no
//!   corresponding capture group is a [`BridgeError::Substitution`] error.
//! - Mappings: rebuilt key-by-key with each value substituted recursively.
//! - Any other value type (null, bool, numbers, sequences) passes through
//!   unchanged.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A configuration value that may contain placeholder tokens.
///
/// Mirrors the YAML data model; mappings use sorted keys so that listings
/// and serialized output are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    /// YAML null
    Null,
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Integer(i64),
    /// Floating-point scalar
    Float(f64),
    /// String scalar, the only substitution target
    String(String),
    /// Sequence of values (passed through unchanged by substitution)
    Sequence(Vec<TemplateValue>),
    /// Nested mapping (substituted recursively)
    Mapping(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Borrow the string contents, if this is a string scalar
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the mapping contents, if this is a mapping
    #[must_use]
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, TemplateValue>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value` for JSON output
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Integer(i) => serde_json::Value::Number(i.into()),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null), // NaN/Infinity as null
            Self::String(s) => serde_json::Value::String(s),
            Self::Sequence(items) => {
                serde_json::Value::Array(items.into_iter().map(Self::into_json).collect())
            }
            Self::Mapping(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

/// Pattern for placeholder tokens: `{{<decimal index>}}`
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{([0-9]+)\}\}").unwrap_or_else(|e| panic!("invalid placeholder pattern: {e}"))
    })
}

/// Substitute positional arguments into a template value.
///
/// Returns a new value; `template` itself is left untouched. See the module
/// documentation for the per-type rules.
pub fn substitute(template: &TemplateValue, args: &[String]) -> Result<TemplateValue> {
    match template {
        TemplateValue::String(s) => Ok(TemplateValue::String(substitute_str(s, args)?)),
        TemplateValue::Mapping(map) => {
            let mut resolved = BTreeMap::new();
            for (key, value) in map {
                resolved.insert(key.clone(), substitute(value, args)?);
            }
            Ok(TemplateValue::Mapping(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Replace every `{{i}}` token in `template` with `args[i]`.
fn substitute_str(template: &str, args: &[String]) -> Result<String> {
    let pattern = placeholder_pattern();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for token in pattern.find_iter(template) {
        out.push_str(&template[last..token.start()]);

        // Token text is "{{<digits>}}"; strip the braces to get the index.
        let digits = &template[token.start() + 2..token.end() - 2];
        let index: usize = digits.parse().map_err(|_| {
            BridgeError::invalid_input(format!("placeholder index '{digits}' is not a valid index"))
        })?;

        let value = args
            .get(index)
            .ok_or_else(|| BridgeError::substitution(index, args.len()))?;
        out.push_str(value);
        last = token.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn yaml(document: &str) -> TemplateValue {
        serde_yaml::from_str(document).expect("test document should parse")
    }

    #[test]
    fn test_substitute_simple_string() {
        let template = TemplateValue::String("{{0}}-{{1}}".to_string());
        let resolved = substitute(&template, &args(&["x", "y"])).unwrap();
        assert_eq!(resolved, TemplateValue::String("x-y".to_string()));
    }

    #[test]
    fn test_substitute_repeated_and_adjacent_tokens() {
        let template = TemplateValue::String("{{0}}{{0}}/{{1}}{{0}}".to_string());
        let resolved = substitute(&template, &args(&["a", "b"])).unwrap();
        assert_eq!(resolved, TemplateValue::String("aa/ba".to_string()));
    }

    #[test]
    fn test_substitute_leaves_template_untouched() {
        let template = TemplateValue::String("host-{{0}}.internal".to_string());

        let first = substitute(&template, &args(&["alpha"])).unwrap();
        let second = substitute(&template, &args(&["beta"])).unwrap();

        assert_eq!(first.as_str(), Some("host-alpha.internal"));
        assert_eq!(second.as_str(), Some("host-beta.internal"));
        // Template still carries the token after both calls
        assert_eq!(template.as_str(), Some("host-{{0}}.internal"));
    }

    #[test]
    fn test_substitute_nested_mapping() {
        let template = yaml(
            r"
            query: SELECT * FROM {{0}}
            opts:
              limit: 'rows {{1}}'
            ",
        );

        let resolved = substitute(&template, &args(&["users", "10"])).unwrap();
        let map = resolved.as_mapping().unwrap();
        assert_eq!(map["query"].as_str(), Some("SELECT * FROM users"));
        let opts = map["opts"].as_mapping().unwrap();
        assert_eq!(opts["limit"].as_str(), Some("rows 10"));
    }

    #[test]
    fn test_substitute_siblings_do_not_interfere() {
        let template = yaml(
            r"
            a: '{{0}}'
            b: '{{1}}'
            ",
        );

        let resolved = substitute(&template, &args(&["left", "right"])).unwrap();
        let map = resolved.as_mapping().unwrap();
        assert_eq!(map["a"].as_str(), Some("left"));
        assert_eq!(map["b"].as_str(), Some("right"));
    }

    #[test]
    fn test_substitute_out_of_range_index_fails() {
        let template = TemplateValue::String("{{5}}".to_string());
        let err = substitute(&template, &args(&["a", "b"])).unwrap_err();
        assert!(matches!(err, BridgeError::Substitution { index: 5, available: 2 }));
    }

    #[test]
    fn test_substitute_no_args_no_tokens() {
        let template = TemplateValue::String("plain value".to_string());
        let resolved = substitute(&template, &[]).unwrap();
        assert_eq!(resolved.as_str(), Some("plain value"));
    }

    #[test]
    fn test_substitute_passes_scalars_through() {
        for template in [
            TemplateValue::Null,
            TemplateValue::Bool(true),
            TemplateValue::Integer(3306),
            TemplateValue::Float(1.5),
        ] {
            let resolved = substitute(&template, &args(&["unused"])).unwrap();
            assert_eq!(resolved, template);
        }
    }

    #[test]
    fn test_substitute_passes_sequences_through() {
        let template = yaml("[ '{{0}}', 'literal' ]");
        let resolved = substitute(&template, &args(&["x"])).unwrap();
        // Sequences are not substitution targets; the token survives verbatim
        assert_eq!(resolved, template);
    }

    #[test]
    fn test_substitute_oversized_index_is_rejected() {
        let template = TemplateValue::String("{{99999999999999999999}}".to_string());
        let err = substitute(&template, &args(&["a"])).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[test]
    fn test_single_braces_are_not_tokens() {
        let template = TemplateValue::String("{0} and {{x}} stay put".to_string());
        let resolved = substitute(&template, &[]).unwrap();
        assert_eq!(resolved.as_str(), Some("{0} and {{x}} stay put"));
    }

    #[test]
    fn test_yaml_round_trip_into_json() {
        let value = yaml(
            r"
            host: db.example.com
            port: 3306
            tags: [primary, eu]
            ",
        );
        let json = value.into_json();
        assert_eq!(json["host"], "db.example.com");
        assert_eq!(json["port"], 3306);
        assert_eq!(json["tags"][0], "primary");
    }
}
