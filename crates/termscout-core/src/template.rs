//! Placeholder substitution over agent/task template trees.
//!
//! Every string leaf at every depth is rewritten; keys, sequence order and
//! non-string scalars pass through untouched. The input tree is only borrowed,
//! so callers always get an independent copy back.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Nested mapping/sequence/scalar structure loaded from a YAML template.
pub type ConfigTree = Value;

/// Token replaced with the resolved entity name.
pub const PLACEHOLDER: &str = "{entity_name}";

/// Binding name behind [`PLACEHOLDER`].
pub const ENTITY_BINDING: &str = "entity_name";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("unsupported template value at `{path}`: {reason}")]
    UnsupportedValue { path: String, reason: &'static str },
}

/// Named input values substituted as `{name}` tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(entity: impl Into<String>) -> Self {
        Self::new().with(ENTITY_BINDING, entity)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn tokens(&self) -> Vec<(String, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (format!("{{{name}}}"), value.as_str()))
            .collect()
    }
}

/// Replace every [`PLACEHOLDER`] in `tree` with `entity`.
pub fn interpolate(tree: &ConfigTree, entity: &str) -> Result<ConfigTree, InterpolationError> {
    interpolate_with(tree, &Bindings::entity(entity))
}

/// Replace every `{name}` token for each binding, in a single pass per leaf.
///
/// Replacement is literal: text inserted by a binding is never rescanned, so a
/// value that itself contains a token is inserted verbatim.
pub fn interpolate_with(
    tree: &ConfigTree,
    bindings: &Bindings,
) -> Result<ConfigTree, InterpolationError> {
    let tokens = bindings.tokens();
    walk(tree, &tokens, "$")
}

fn walk(value: &Value, tokens: &[(String, &str)], path: &str) -> Result<Value, InterpolationError> {
    match value {
        Value::String(text) => Ok(Value::String(substitute(text, tokens))),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| walk(item, tokens, &format!("{path}[{idx}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, item) in map {
                let key_label = scalar_label(key).ok_or_else(|| {
                    InterpolationError::UnsupportedValue {
                        path: path.to_string(),
                        reason: "mapping keys must be scalars",
                    }
                })?;
                let child = walk(item, tokens, &format!("{path}.{key_label}"))?;
                out.insert(key.clone(), child);
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(_) => Err(InterpolationError::UnsupportedValue {
            path: path.to_string(),
            reason: "tagged values are not supported",
        }),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
    }
}

// Each token is located in the original text, so replacements never cascade
// into text produced by another binding.
fn substitute(text: &str, tokens: &[(String, &str)]) -> String {
    if tokens.is_empty() || !text.contains('{') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while !rest.is_empty() {
        for (token, replacement) in tokens {
            if let Some(tail) = rest.strip_prefix(token.as_str()) {
                out.push_str(replacement);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            out.push(ch);
        }
        rest = chars.as_str();
    }
    out
}

fn scalar_label(key: &Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some("~".to_string()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

/// Count remaining [`PLACEHOLDER`] tokens across all string leaves.
pub fn placeholder_count(tree: &ConfigTree) -> usize {
    match tree {
        Value::String(text) => text.matches(PLACEHOLDER).count(),
        Value::Sequence(items) => items.iter().map(placeholder_count).sum(),
        Value::Mapping(map) => map.values().map(placeholder_count).sum(),
        Value::Tagged(tagged) => placeholder_count(&tagged.value),
        Value::Null | Value::Bool(_) | Value::Number(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(yaml: &str) -> ConfigTree {
        serde_yaml::from_str(yaml).expect("test yaml should parse")
    }

    #[test]
    fn replaces_goal_for_researcher() {
        let agents = tree("researcher:\n  goal: \"Find T&C for {entity_name}\"\n");
        let rendered = interpolate(&agents, "Amazon Prime").unwrap();
        assert_eq!(
            rendered,
            tree("researcher:\n  goal: \"Find T&C for Amazon Prime\"\n")
        );
    }

    #[test]
    fn leaves_input_untouched() {
        let original = tree("task:\n  description: \"Research {entity_name}\"\n");
        let snapshot = original.clone();
        let _ = interpolate(&original, "Netflix").unwrap();
        assert_eq!(original, snapshot);
    }

    #[test]
    fn visits_nested_sequences_and_preserves_scalars() {
        let input = tree(
            r#"
reporting:
  steps:
    - "Open {entity_name} site"
    - nested:
        - "{entity_name} / {entity_name}"
  retries: 3
  verbose: false
  ratio: 0.5
  missing: ~
"#,
        );
        let rendered = interpolate(&input, "Spotify").unwrap();
        let expected = tree(
            r#"
reporting:
  steps:
    - "Open Spotify site"
    - nested:
        - "Spotify / Spotify"
  retries: 3
  verbose: false
  ratio: 0.5
  missing: ~
"#,
        );
        assert_eq!(rendered, expected);
        assert_eq!(placeholder_count(&rendered), 0);
    }

    #[test]
    fn keys_are_not_rewritten() {
        let input = tree("\"{entity_name}\": \"{entity_name}\"\n");
        let rendered = interpolate(&input, "Hulu").unwrap();
        assert_eq!(rendered, tree("\"{entity_name}\": Hulu\n"));
    }

    #[test]
    fn serialization_sensitive_characters_are_inserted_verbatim() {
        let input = tree("goal: \"Look up {entity_name}\"\n");
        let rendered = interpolate(&input, r#"Ben "&" Jerry's \ Co"#).unwrap();
        assert_eq!(
            rendered["goal"],
            Value::String(r#"Look up Ben "&" Jerry's \ Co"#.to_string())
        );
    }

    #[test]
    fn entity_containing_placeholder_does_not_cascade() {
        let input = tree("goal: \"{entity_name}!\"\n");
        let rendered = interpolate(&input, "x{entity_name}").unwrap();
        assert_eq!(rendered["goal"], Value::String("x{entity_name}!".into()));
    }

    #[test]
    fn multiple_bindings_substitute_independently() {
        let input = tree("description: \"{entity_name} terms as of {current_year} ({unknown})\"\n");
        let bindings = Bindings::entity("{current_year}").with("current_year", "2026");
        let rendered = interpolate_with(&input, &bindings).unwrap();
        assert_eq!(
            rendered["description"],
            Value::String("{current_year} terms as of 2026 ({unknown})".into())
        );
    }

    #[test]
    fn tagged_values_are_rejected() {
        let input = tree("researcher:\n  goal: !custom \"{entity_name}\"\n");
        let err = interpolate(&input, "Netflix").unwrap_err();
        assert_eq!(
            err,
            InterpolationError::UnsupportedValue {
                path: "$.researcher.goal".into(),
                reason: "tagged values are not supported",
            }
        );
    }

    #[test]
    fn complex_keys_are_rejected() {
        let input = tree("? [a, b]\n: value\n");
        assert!(interpolate(&input, "Netflix").is_err());
    }

    #[test]
    fn non_ascii_text_survives() {
        let input = tree("goal: \"Résumé für {entity_name} ✓\"\n");
        let rendered = interpolate(&input, "Zürich Bank").unwrap();
        assert_eq!(
            rendered["goal"],
            Value::String("Résumé für Zürich Bank ✓".into())
        );
    }
}
