//! Caller-held conversation state for multi-turn study sessions.
//!
//! The server keeps nothing between requests. Each call receives the full
//! prior [`ConversationState`] and returns the next one, with references
//! and room codes mined from the latest model text merged in.

use once_cell::sync::Lazy;
use palace::targets::BOOKS;
use palace::Taxonomy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::MessageRole;

/// Book names plus common singular/short forms, longest first so the
/// alternation prefers "1 John" over "John".
static BOOK_ALTERNATION: Lazy<String> = Lazy::new(|| {
    let mut names: Vec<&str> = BOOKS.to_vec();
    names.extend(["Psalm", "Song of Songs", "Revelations"]);
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    names
        .iter()
        .map(|name| regex::escape(name).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
});

/// `<Book> <chapter>:<verse>(-<verse>)?`
static REFERENCE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    let source = format!(
        r"\b(?:{})\s+\d{{1,3}}:\d{{1,3}}(?:\s*[-–]\s*\d{{1,3}})?\b",
        BOOK_ALTERNATION.as_str()
    );
    Regex::new(&source)
        .map_err(|e| tracing::error!(error = %e, "Invalid reference pattern"))
        .ok()
});

/// One entry in the round-tripped turn log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLogEntry {
    pub role: MessageRole,
    pub text: String,
}

/// Session state owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Reference the session started from
    pub anchor: String,
    /// References already discussed, in first-seen order
    #[serde(default)]
    pub used_references: Vec<String>,
    /// Room codes already used, in first-seen order
    #[serde(default)]
    pub used_categories: Vec<String>,
    #[serde(default)]
    pub turn_log: Vec<TurnLogEntry>,
}

impl ConversationState {
    /// Fresh session rooted at `anchor`.
    pub fn new(anchor: impl Into<String>) -> Self {
        Self {
            anchor: normalize(&anchor.into()),
            ..Default::default()
        }
    }

    /// Copy of this state with one more turn logged.
    pub fn with_turn(&self, role: MessageRole, text: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.turn_log.push(TurnLogEntry {
            role,
            text: text.into(),
        });
        next
    }
}

/// Collapse runs of whitespace to one space and trim the ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Mines entities from model text and merges them into caller state.
pub struct ConversationStore {
    category_re: Option<Regex>,
}

impl ConversationStore {
    /// Build a store recognising the codes in `taxonomy` as category tokens.
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let mut codes: Vec<&str> = taxonomy.codes().collect();
        codes.sort_by_key(|code| std::cmp::Reverse(code.len()));

        let source = format!(
            r"\b(?:{})\b",
            codes
                .iter()
                .map(|c| regex::escape(c))
                .collect::<Vec<_>>()
                .join("|")
        );

        let category_re = Regex::new(&source)
            .map_err(|e| tracing::error!(error = %e, "Invalid category token pattern"))
            .ok();

        Self { category_re }
    }

    /// Store over the process-wide palace.
    pub fn palace() -> Self {
        Self::new(palace::taxonomy())
    }

    /// Bible references in `text`, normalized, in order of appearance.
    pub fn extract_references(&self, text: &str) -> Vec<String> {
        match REFERENCE_RE.as_ref() {
            Some(re) => re.find_iter(text).map(|m| normalize(m.as_str())).collect(),
            None => Vec::new(),
        }
    }

    /// Room codes appearing as standalone tokens in `text`.
    pub fn extract_categories(&self, text: &str) -> Vec<String> {
        match &self.category_re {
            Some(re) => re.find_iter(text).map(|m| m.as_str().to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// Next state after the model produced `text`.
    ///
    /// Pure: `state` is untouched, and the same inputs always give the same
    /// output. Existing entries are kept as supplied; new ones are appended
    /// only if no normalized-equal entry is already present.
    pub fn advance(&self, state: &ConversationState, text: &str) -> ConversationState {
        let mut next = state.clone();
        merge(&mut next.used_references, self.extract_references(text));
        merge(&mut next.used_categories, self.extract_categories(text));
        next
    }
}

fn merge(into: &mut Vec<String>, found: Vec<String>) {
    for item in found {
        let item = normalize(&item);
        if item.is_empty() {
            continue;
        }
        if !into.iter().any(|existing| normalize(existing) == item) {
            into.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::palace()
    }

    #[test]
    fn test_single_reference_from_empty_state() {
        let state = ConversationState::new("John 3:16");
        let next = store().advance(&state, "Consider how Romans 8:28 frames suffering.");
        assert_eq!(next.used_references, vec!["Romans 8:28".to_string()]);
        assert!(state.used_references.is_empty());
    }

    #[test]
    fn test_numbered_books_and_ranges() {
        let refs = store().extract_references("Compare 1 John 4:8 with Song of Solomon 2:4-6 and John  1:1.");
        assert_eq!(refs, vec!["1 John 4:8", "Song of Solomon 2:4-6", "John 1:1"]);
    }

    #[test]
    fn test_capitalized_prose_is_not_a_book() {
        assert_eq!(store().extract_references("See Romans 8:28"), vec!["Romans 8:28"]);
        assert!(store().extract_references("Chapter 3:16 of nothing").is_empty());
    }

    #[test]
    fn test_category_tokens() {
        let cats = store().extract_categories("Walk it through the DR and then C6; skip DRY runs.");
        assert_eq!(cats, vec!["DR", "C6"]);
    }

    #[test]
    fn test_advance_is_idempotent() {
        let text = "Romans 8:28 in the DR, then Romans 8:28 again in TZ.";
        let once = store().advance(&ConversationState::new("Romans 8"), text);
        let twice = store().advance(&once, text);
        assert_eq!(once, twice);
        assert_eq!(once.used_references, vec!["Romans 8:28"]);
        assert_eq!(once.used_categories, vec!["DR", "TZ"]);
    }

    #[test]
    fn test_advance_is_monotonic_and_keeps_input() {
        let mut state = ConversationState::new("Genesis 1:1");
        state.used_references = vec!["Genesis  1:1".into(), "Exodus 3:14".into()];
        state.used_categories = vec!["SR".into()];

        let next = store().advance(&state, "Genesis 1:1 meets John 1:1 in the FRt.");

        for r in &state.used_references {
            assert!(next.used_references.contains(r));
        }
        assert_eq!(next.used_references.len(), 3);
        assert_eq!(next.used_categories, vec!["SR", "FRt"]);
    }

    #[test]
    fn test_state_round_trips_camel_case() {
        let state = ConversationState::new("  Psalm   23:1 ")
            .with_turn(MessageRole::User, "Why shepherd?");
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["anchor"], "Psalm 23:1");
        assert!(json["usedReferences"].is_array());
        assert_eq!(json["turnLog"][0]["role"], "user");

        let partial: ConversationState = serde_json::from_value(serde_json::json!({"anchor": "Ruth 1:16"})).unwrap();
        assert!(partial.turn_log.is_empty());
    }
}
