//! Challenge/response turn protocol for the chain game.
//!
//! Each move is a [`TurnRecord`]: a reference, commentary on it, and a
//! challenge of the form `"<category> - <target>"` for the next player.
//! Vague challenges (no target) are repaired by drawing a concrete target
//! from the category's fixed enumeration. Moves missing required fields
//! are rejected outright.
//!
//! The protocol is cooperative: callers serialize turns and pass the prior
//! move back in. Nothing is stored here.

use palace::{targets_for, PromptAssembler, TargetSet};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{CompletionRequest, LlmBackend, LlmError};
use crate::parser::{excerpt, ResponseParser};

/// Default minimum commentary length, roughly three sentences.
pub const DEFAULT_MIN_COMMENTARY_CHARS: usize = 120;

/// Score served when the model's verdict has no usable number.
pub const DEFAULT_SCORE: u8 = 5;

pub const MAX_SCORE: u8 = 10;

const EXCERPT_CHARS: usize = 200;
const CHALLENGE_SEPARATOR: &str = " - ";

/// One move in the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub reference: String,
    pub commentary: String,
    pub challenge: String,
}

impl TurnRecord {
    /// Category half of the challenge.
    pub fn challenge_category(&self) -> &str {
        split_challenge(&self.challenge).0
    }
}

/// How hard the scorer should grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Standard,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Standard => "standard",
            Self::Expert => "expert",
        }
    }

    fn rubric(&self) -> &'static str {
        match self {
            Self::Easy => "Reward any reasonable connection to the challenge. Be encouraging.",
            Self::Standard => {
                "Expect a clear link between the reference and the challenge target, with some explanation."
            }
            Self::Expert => {
                "Expect a precise, well-argued link that uses the named target specifically. Penalize vagueness."
            }
        }
    }
}

/// A graded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Always within `0..=10`
    pub score: u8,
    pub feedback: String,
    /// True when the model's score could not be read and the default was used
    pub defaulted: bool,
}

/// Turn protocol failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TurnError {
    /// The move cannot be turned into a game-valid record.
    #[error("Malformed turn: {reason}")]
    MalformedTurn { reason: String, excerpt: String },

    #[error(transparent)]
    Upstream(#[from] LlmError),
}

/// Loose shape of a model move; every field may be missing.
#[derive(Debug, Default, Deserialize)]
struct RawMove {
    reference: Option<String>,
    commentary: Option<String>,
    challenge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScore {
    score: Option<serde_json::Value>,
    feedback: Option<String>,
}

/// The chain-game turn engine.
#[derive(Debug, Clone)]
pub struct TurnProtocol {
    min_commentary_chars: usize,
}

impl Default for TurnProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_COMMENTARY_CHARS)
    }
}

impl TurnProtocol {
    pub fn new(min_commentary_chars: usize) -> Self {
        Self {
            min_commentary_chars,
        }
    }

    pub fn min_commentary_chars(&self) -> usize {
        self.min_commentary_chars
    }

    /// Build the model request for the next move.
    pub fn move_request(
        &self,
        prior: Option<&TurnRecord>,
        available_categories: &[String],
        used_references: &[String],
    ) -> CompletionRequest {
        let mut system = String::from(
            "You are playing a Bible chain game. Reply with ONLY a JSON object:\n\
             {\"reference\": \"Book C:V\", \"commentary\": \"...\", \"challenge\": \"<category> - <specific target>\"}\n\
             The commentary must be at least three full sentences. The challenge MUST name one specific \
             target after \" - \", never just the category.\n",
        );
        system.push_str(&format!(
            "Choose the challenge category from: {}.\n",
            available_categories.join(", ")
        ));
        system.push_str(&PromptAssembler::build_avoid_prompt(used_references, &[]));

        let user = match prior {
            Some(prior) => format!(
                "The previous player played {} and challenged you with \"{}\". \
                 Answer the challenge with a new reference, then set your own challenge.",
                prior.reference, prior.challenge
            ),
            None => "Open the game with the first move.".to_string(),
        };

        CompletionRequest::user(user)
            .with_system(system)
            .with_temperature(0.9)
            .with_json_output()
    }

    /// Turn raw model output into a game-valid move.
    ///
    /// Returns the record and whether the challenge had to be repaired.
    pub fn accept_move<R: Rng + ?Sized>(
        &self,
        raw: &str,
        available_categories: &[String],
        rng: &mut R,
    ) -> Result<(TurnRecord, bool), TurnError> {
        let malformed = |reason: &str| TurnError::MalformedTurn {
            reason: reason.to_string(),
            excerpt: excerpt(raw, EXCERPT_CHARS),
        };

        let parsed: RawMove =
            ResponseParser::try_parse(raw).ok_or_else(|| malformed("move is not a JSON object"))?;

        let reference = required(parsed.reference).ok_or_else(|| malformed("missing reference"))?;
        let commentary = required(parsed.commentary).ok_or_else(|| malformed("missing commentary"))?;
        let challenge = required(parsed.challenge).ok_or_else(|| malformed("missing challenge"))?;

        if commentary.chars().count() < self.min_commentary_chars {
            return Err(malformed(&format!(
                "commentary shorter than {} characters",
                self.min_commentary_chars
            )));
        }

        let (challenge, repaired) =
            match self.repair_challenge(&challenge, available_categories, rng) {
                Some(fixed) => (fixed, true),
                None if is_specific(&challenge) => (challenge, false),
                None => return Err(malformed("challenge has no target and no known category")),
            };

        Ok((
            TurnRecord {
                reference,
                commentary,
                challenge,
            },
            repaired,
        ))
    }

    /// Rewrite a vague challenge as `"<category> - <target>"`.
    ///
    /// Returns `None` if the challenge is already specific, or if no target
    /// set can be found for it.
    pub fn repair_challenge<R: Rng + ?Sized>(
        &self,
        challenge: &str,
        available_categories: &[String],
        rng: &mut R,
    ) -> Option<String> {
        if is_specific(challenge) {
            return None;
        }

        let category = split_challenge(challenge).0;
        let set = resolve_target_set(category, available_categories)?;
        let target = set.targets.choose(rng)?;

        debug!(category = set.name, target = %target, "Repaired vague challenge");
        Some(format!("{}{}{}", set.name, CHALLENGE_SEPARATOR, target))
    }

    /// Ask the model for a move and validate it.
    pub async fn propose_move<R: Rng + Send + ?Sized>(
        &self,
        backend: &dyn LlmBackend,
        prior: Option<&TurnRecord>,
        available_categories: &[String],
        used_references: &[String],
        rng: &mut R,
    ) -> Result<(TurnRecord, bool), TurnError> {
        let request = self.move_request(prior, available_categories, used_references);
        let response = backend.complete(request).await?;
        let accepted = self.accept_move(&response.content, available_categories, rng)?;

        if accepted.1 {
            info!(challenge = %accepted.0.challenge, "Served repaired challenge");
        }
        Ok(accepted)
    }

    /// Build the model request that grades `response` against `challenge`.
    pub fn score_request(
        &self,
        response: &TurnRecord,
        challenge: &TurnRecord,
        difficulty: Difficulty,
    ) -> CompletionRequest {
        let system = format!(
            "You judge a Bible chain game. Difficulty: {}. {}\n\
             Reply with ONLY a JSON object: {{\"score\": <integer 0-10>, \"feedback\": \"...\"}}",
            difficulty.as_str(),
            difficulty.rubric()
        );

        let user = format!(
            "Challenge: {}\n\nAnswer reference: {}\nAnswer commentary: {}",
            challenge.challenge, response.reference, response.commentary
        );

        CompletionRequest::user(user)
            .with_system(system)
            .with_temperature(0.2)
            .with_json_output()
    }

    /// Read a score out of model output, clamping and defaulting as needed.
    pub fn accept_score(&self, raw: &str) -> Score {
        let parsed: Option<RawScore> = ResponseParser::try_parse(raw);
        let (number, feedback) = match parsed {
            Some(p) => (p.score.as_ref().and_then(as_number), p.feedback),
            None => (None, None),
        };

        let feedback = feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "No detailed feedback was available for this answer.".to_string());

        match number {
            Some(n) => Score {
                score: n.round().clamp(0.0, MAX_SCORE as f64) as u8,
                feedback,
                defaulted: false,
            },
            None => Score {
                score: DEFAULT_SCORE,
                feedback,
                defaulted: true,
            },
        }
    }

    /// Grade a response with the model.
    pub async fn score(
        &self,
        backend: &dyn LlmBackend,
        response: &TurnRecord,
        challenge: &TurnRecord,
        difficulty: Difficulty,
    ) -> Result<Score, LlmError> {
        let request = self.score_request(response, challenge, difficulty);
        let completion = backend.complete(request).await?;
        Ok(self.accept_score(&completion.content))
    }
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|f| f.trim().to_string()).filter(|f| !f.is_empty())
}

/// Split on the first separator; the target is empty when there is none.
fn split_challenge(challenge: &str) -> (&str, &str) {
    match challenge.split_once(CHALLENGE_SEPARATOR) {
        Some((category, target)) => (category.trim(), target.trim()),
        None => (challenge.trim().trim_end_matches('-').trim(), ""),
    }
}

fn is_specific(challenge: &str) -> bool {
    let (category, target) = split_challenge(challenge);
    !category.is_empty() && !target.is_empty()
}

/// Target set for the named category, falling back to the first available
/// category that has one.
fn resolve_target_set(category: &str, available: &[String]) -> Option<&'static TargetSet> {
    targets_for(category).or_else(|| available.iter().find_map(|c| targets_for(c)))
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use palace::targets::{BOOKS, BOOKS_OF_THE_BIBLE, PALACE_ROOMS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    const COMMENTARY: &str = "Joseph forgives his brothers and names the providence of God. \
        What they meant for evil, God meant for good. The pattern runs straight to the cross.";

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn categories() -> Vec<String> {
        vec![BOOKS_OF_THE_BIBLE.to_string(), PALACE_ROOMS.to_string()]
    }

    fn raw_move(challenge: &str) -> String {
        json!({
            "reference": "Genesis 50:20",
            "commentary": COMMENTARY,
            "challenge": challenge,
        })
        .to_string()
    }

    #[test]
    fn test_specific_challenge_passes_through() {
        let protocol = TurnProtocol::default();
        let (record, repaired) = protocol
            .accept_move(&raw_move("Books of the Bible - Ruth"), &categories(), &mut rng())
            .unwrap();

        assert!(!repaired);
        assert_eq!(record.challenge, "Books of the Bible - Ruth");
        assert_eq!(record.challenge_category(), BOOKS_OF_THE_BIBLE);
    }

    #[test]
    fn test_vague_challenge_is_repaired_from_fixed_list() {
        let protocol = TurnProtocol::default();
        let (record, repaired) = protocol
            .accept_move(&raw_move("Books of the Bible"), &categories(), &mut rng())
            .unwrap();

        assert!(repaired);
        let target = record
            .challenge
            .strip_prefix("Books of the Bible - ")
            .expect("repaired challenge keeps its category");
        assert!(BOOKS.contains(&target));
    }

    #[test]
    fn test_dangling_separator_is_repaired() {
        let protocol = TurnProtocol::default();
        let (record, repaired) = protocol
            .accept_move(&raw_move("Palace Rooms - "), &categories(), &mut rng())
            .unwrap();

        assert!(repaired);
        assert!(record.challenge.starts_with("Palace Rooms - "));
        assert!(record.challenge.len() > "Palace Rooms - ".len());
    }

    #[test]
    fn test_repair_is_reproducible_with_seed() {
        let protocol = TurnProtocol::default();
        let a = protocol.repair_challenge("Books of the Bible", &categories(), &mut rng());
        let b = protocol.repair_challenge("Books of the Bible", &categories(), &mut rng());
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_vague_category_falls_back_to_available() {
        let protocol = TurnProtocol::default();
        let fixed = protocol
            .repair_challenge("Mountains", &categories(), &mut rng())
            .unwrap();
        assert!(fixed.starts_with("Books of the Bible - "));

        let none = protocol.repair_challenge("Mountains", &[], &mut rng());
        assert!(none.is_none());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let protocol = TurnProtocol::default();
        let raw = json!({ "reference": "John 1:1", "challenge": "Books of the Bible - Ruth" }).to_string();

        match protocol.accept_move(&raw, &categories(), &mut rng()) {
            Err(TurnError::MalformedTurn { reason, excerpt }) => {
                assert_eq!(reason, "missing commentary");
                assert!(excerpt.contains("John 1:1"));
            }
            other => panic!("expected malformed turn, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_move_is_malformed() {
        let protocol = TurnProtocol::default();
        let err = protocol
            .accept_move("I would play Genesis 1:1!", &categories(), &mut rng())
            .unwrap_err();
        assert!(matches!(err, TurnError::MalformedTurn { .. }));
    }

    #[test]
    fn test_short_commentary_is_malformed() {
        let protocol = TurnProtocol::default();
        let raw = json!({
            "reference": "John 11:35",
            "commentary": "Jesus wept.",
            "challenge": "Books of the Bible - Job",
        })
        .to_string();

        let err = protocol.accept_move(&raw, &categories(), &mut rng()).unwrap_err();
        assert!(matches!(err, TurnError::MalformedTurn { ref reason, .. } if reason.contains("shorter")));

        let lenient = TurnProtocol::new(5);
        assert!(lenient.accept_move(&raw, &categories(), &mut rng()).is_ok());
    }

    #[test]
    fn test_score_is_clamped() {
        let protocol = TurnProtocol::default();
        assert_eq!(protocol.accept_score(r#"{"score": 14, "feedback": "Wow"}"#).score, 10);
        assert_eq!(protocol.accept_score(r#"{"score": -3, "feedback": "Hm"}"#).score, 0);
        assert_eq!(protocol.accept_score(r#"{"score": "7", "feedback": "Ok"}"#).score, 7);
    }

    #[test]
    fn test_unreadable_score_defaults_to_mid_range() {
        let protocol = TurnProtocol::default();
        let score = protocol.accept_score("Great answer, I'd say an eight.");
        assert_eq!(score.score, DEFAULT_SCORE);
        assert!(score.defaulted);
        assert!(!score.feedback.is_empty());

        let score = protocol.accept_score(r#"{"score": "high", "feedback": "Nice link"}"#);
        assert_eq!(score.score, DEFAULT_SCORE);
        assert_eq!(score.feedback, "Nice link");
    }

    #[tokio::test]
    async fn test_propose_move_with_mock_backend() {
        let backend = MockBackend::default().then_respond(format!(
            "```json\n{}\n```",
            raw_move("Books of the Bible")
        ));
        let protocol = TurnProtocol::default();

        let (record, repaired) = protocol
            .propose_move(&backend, None, &categories(), &[], &mut rng())
            .await
            .unwrap();

        assert!(repaired);
        assert_eq!(record.reference, "Genesis 50:20");
        assert_eq!(backend.call_count(), 1);

        let request = backend.last_request().unwrap();
        assert!(request.wants_json());
        assert!(request.system_prompt.unwrap().contains("Books of the Bible, Palace Rooms"));
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_retried() {
        let backend = MockBackend::default().then_fail(LlmError::PaymentRequired);
        let protocol = TurnProtocol::default();

        let err = protocol
            .propose_move(&backend, None, &categories(), &[], &mut rng())
            .await
            .unwrap_err();

        assert_eq!(err, TurnError::Upstream(LlmError::PaymentRequired));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_score_with_mock_backend() {
        let backend = MockBackend::default().with_response(r#"{"score": 8, "feedback": "Solid link."}"#);
        let protocol = TurnProtocol::default();
        let challenge = TurnRecord {
            reference: "Genesis 50:20".into(),
            commentary: COMMENTARY.into(),
            challenge: "Books of the Bible - Ruth".into(),
        };
        let answer = TurnRecord {
            reference: "Ruth 1:16".into(),
            commentary: COMMENTARY.into(),
            challenge: "Palace Rooms - Story Room".into(),
        };

        let score = protocol
            .score(&backend, &answer, &challenge, Difficulty::Expert)
            .await
            .unwrap();

        assert_eq!(score.score, 8);
        assert!(!score.defaulted);
        assert!(backend.last_request().unwrap().system_prompt.unwrap().contains("expert"));
    }
}
