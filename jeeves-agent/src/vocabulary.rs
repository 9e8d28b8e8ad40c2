//! Closed-vocabulary hallucination gate.
//!
//! Model prose tags principles as `(CODE - Label)`. For every palace room
//! that enumerates its labels, any tagged label outside that list is a
//! hallucination. The validator reports every offending pair; it never
//! rewrites or strips text.

use std::collections::HashSet;

use palace::{Category, Taxonomy};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A category/label pair that is not in the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Category code as written, e.g. `C6`
    pub category: String,
    /// Offending label, trimmed
    pub found_label: String,
    /// Labels the category actually permits
    pub allowed_labels: Vec<String>,
}

/// Outcome of a vocabulary check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub ok: bool,
    pub violations: Vec<Violation>,
}

struct CategoryPattern {
    category: &'static Category,
    pattern: Regex,
}

/// Scans text for `(CODE - Label)` tags against a taxonomy.
///
/// Patterns are compiled once per enumerated category at construction.
pub struct VocabularyValidator {
    taxonomy: &'static Taxonomy,
    patterns: Vec<CategoryPattern>,
}

impl VocabularyValidator {
    /// Build a validator for the given taxonomy.
    pub fn new(taxonomy: &'static Taxonomy) -> Self {
        let patterns = taxonomy
            .enumerated()
            .filter_map(|category| {
                // Code is matched case-sensitively; the label capture is checked separately.
                // One level of parentheses inside the label is part of the label.
                let source = format!(
                    r"\(\s*{}\s*-\s*((?:[^()\n]|\([^()\n]*\))+?)\s*\)",
                    regex::escape(category.code)
                );
                Regex::new(&source)
                    .map(|pattern| CategoryPattern { category, pattern })
                    .map_err(|e| {
                        tracing::error!(code = category.code, error = %e, "Invalid vocabulary pattern")
                    })
                    .ok()
            })
            .collect();

        Self { taxonomy, patterns }
    }

    /// Validator over the process-wide palace.
    pub fn palace() -> Self {
        Self::new(palace::taxonomy())
    }

    /// Taxonomy version this validator enforces.
    pub fn taxonomy_version(&self) -> &'static str {
        self.taxonomy.version
    }

    /// Check `text`, reporting each distinct offending pair once.
    pub fn validate(&self, text: &str) -> Validation {
        let mut seen: HashSet<(&'static str, String)> = HashSet::new();
        let mut violations = Vec::new();

        for CategoryPattern { category, pattern } in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(label) = caps.get(1).map(|m| m.as_str().trim()) else {
                    continue;
                };

                if category.allows(label) {
                    continue;
                }

                if seen.insert((category.code, label.to_lowercase())) {
                    violations.push(Violation {
                        category: category.code.to_string(),
                        found_label: label.to_string(),
                        allowed_labels: category.allowed_labels(),
                    });
                }
            }
        }

        Validation {
            ok: violations.is_empty(),
            violations,
        }
    }

    /// Check every string in a JSON value, recursively.
    pub fn validate_json(&self, value: &serde_json::Value) -> Validation {
        let mut text = String::new();
        collect_strings(value, &mut text);
        self.validate(&text)
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
