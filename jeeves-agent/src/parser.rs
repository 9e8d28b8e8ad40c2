//! Tolerant structured-output parsing.
//!
//! Model output is untrusted text. [`ResponseParser::parse`] strips markdown
//! fences, attempts a strict parse, then tries the outermost `{...}` span.
//! If nothing fits the expected shape it hands back the caller's fallback
//! and marks the result degraded. It never panics and never errors.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Result of a tolerant parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// Parsed payload, or the fallback when `degraded`
    pub value: T,
    /// True when the fallback was substituted
    pub degraded: bool,
}

impl<T> Parsed<T> {
    /// Convert into `Some(value)` only if parsing succeeded.
    pub fn ok(self) -> Option<T> {
        (!self.degraded).then_some(self.value)
    }
}

/// Parses structured payloads out of freeform model text.
pub struct ResponseParser;

impl ResponseParser {
    /// Parse `raw` into `T`, substituting `fallback` on failure.
    pub fn parse<T: DeserializeOwned>(raw: &str, fallback: T) -> Parsed<T> {
        match Self::try_parse(raw) {
            Some(value) => Parsed {
                value,
                degraded: false,
            },
            None => {
                debug!(
                    excerpt = %excerpt(raw, 120),
                    "Model output did not parse, serving fallback"
                );
                Parsed {
                    value: fallback,
                    degraded: true,
                }
            }
        }
    }

    /// Parse without a fallback.
    pub fn try_parse<T: DeserializeOwned>(raw: &str) -> Option<T> {
        let body = strip_code_fences(raw);

        if let Ok(value) = serde_json::from_str::<T>(&body) {
            return Some(value);
        }

        let embedded = extract_json_object(&body)?;
        serde_json::from_str::<T>(embedded).ok()
    }
}

/// Remove a leading ```lang fence and a trailing ``` fence, if present.
///
/// The fence may share a line with the payload: `` ```json {"a":1}``` ``.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let tag_len = after_open
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(after_open.len());
    let body = after_open[tag_len..].trim();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// The span from the first `{` to the last `}`.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// First `max_chars` characters of `text`, for logs and error bodies.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Move {
        reference: String,
        challenge: String,
    }

    #[test]
    fn test_fenced_json() {
        let parsed = ResponseParser::parse("```json\n{\"drills\":[]}\n```", json!({"x": 1}));
        assert_eq!(parsed.value, json!({"drills": []}));
        assert!(!parsed.degraded);
    }

    #[test]
    fn test_not_json_serves_fallback() {
        let fallback = json!({"drills": []});
        let parsed = ResponseParser::parse("not json at all", fallback.clone());
        assert_eq!(parsed.value, fallback);
        assert!(parsed.degraded);
        assert!(parsed.ok().is_none());
    }

    #[test]
    fn test_prose_wrapped_object() {
        let raw = "Sure! Here is the move:\n{\"reference\":\"John 1:1\",\"challenge\":\"Books of the Bible - Ruth\"}\nEnjoy.";
        let parsed: Option<Move> = ResponseParser::try_parse(raw);
        assert_eq!(
            parsed,
            Some(Move {
                reference: "John 1:1".into(),
                challenge: "Books of the Bible - Ruth".into(),
            })
        );
    }

    #[test]
    fn test_fence_without_newline_before_close() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_single_line_fence() {
        let parsed = ResponseParser::parse("```json {\"drills\":[]}```", json!({"x": 1}));
        assert_eq!(parsed.value, json!({"drills": []}));
        assert!(!parsed.degraded);

        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_wrong_shape_is_degraded() {
        let parsed = ResponseParser::parse::<Vec<String>>("{\"a\":1}", Vec::new());
        assert!(parsed.degraded);
    }

    #[test]
    fn test_garbage_never_panics() {
        for raw in ["", "```", "}{", "{", "```json", "\u{0}\u{1}", "{\"a\": [}"] {
            let parsed = ResponseParser::parse::<Value>(raw, Value::Null);
            assert!(parsed.degraded, "{raw:?} should degrade");
        }
    }

    #[test]
    fn test_excerpt_truncates() {
        assert_eq!(excerpt("abcdef", 3), "abc…");
        assert_eq!(excerpt("abc", 3), "abc");
    }
}
