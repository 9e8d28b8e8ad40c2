//! `chain-move` and `chain-score`: the two halves of the chain game.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_params, ModeHandler, Validated};
use crate::backend::CompletionRequest;
use crate::conversation::{normalize, ConversationState, ConversationStore};
use crate::service::ServiceError;
use crate::turn::{Difficulty, TurnError, TurnProtocol, TurnRecord};
use crate::types::Strictness;

pub const MOVE_MODE: &str = "chain-move";
pub const SCORE_MODE: &str = "chain-score";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveParams {
    prior_move: Option<TurnRecord>,
    #[serde(default)]
    available_categories: Vec<String>,
    #[serde(default)]
    used_references: Vec<String>,
    #[serde(default)]
    used_categories: Vec<String>,
}

impl MoveParams {
    /// Requested categories, or every category the game can repair.
    fn categories(&self) -> Vec<String> {
        let requested: Vec<String> = self
            .available_categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if requested.is_empty() {
            palace::target_sets()
                .iter()
                .map(|set| set.name.to_string())
                .collect()
        } else {
            requested
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AcceptedMove {
    #[serde(rename = "move")]
    record: TurnRecord,
    repaired: bool,
}

/// Proposes the next move, repairing vague challenges.
pub struct ChainMoveMode {
    protocol: TurnProtocol,
    store: Arc<ConversationStore>,
    rng: Mutex<StdRng>,
}

impl ChainMoveMode {
    pub fn new(protocol: TurnProtocol, store: Arc<ConversationStore>) -> Self {
        Self {
            protocol,
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fix the repair RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }
}

impl ModeHandler for ChainMoveMode {
    fn mode(&self) -> &'static str {
        MOVE_MODE
    }

    fn strictness(&self) -> Strictness {
        Strictness::ValidationCritical
    }

    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError> {
        let params: MoveParams = parse_params(MOVE_MODE, params)?;
        Ok(self.protocol.move_request(
            params.prior_move.as_ref(),
            &params.categories(),
            &params.used_references,
        ))
    }

    fn validate_response(&self, raw: &str, params: &Value) -> Result<Validated, ServiceError> {
        let params: MoveParams = parse_params(MOVE_MODE, params)?;
        let categories = params.categories();

        let (record, repaired) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.protocol.accept_move(raw, &categories, &mut *rng)?
        };

        let accepted = AcceptedMove { record, repaired };
        Ok(Validated::clean(json!(accepted)))
    }

    fn shape_response(&self, validated: Validated, params: &Value) -> Result<Value, ServiceError> {
        let params: MoveParams = parse_params(MOVE_MODE, params)?;
        let accepted: AcceptedMove = serde_json::from_value(validated.value)
            .map_err(|e| ServiceError::InvalidRequest(format!("{}: {}", MOVE_MODE, e)))?;

        let seen = ConversationState {
            used_references: params.used_references,
            used_categories: params.used_categories,
            ..Default::default()
        };
        let text = format!("{}\n{}", accepted.record.reference, accepted.record.commentary);
        let mut seen = self.store.advance(&seen, &text);

        let category = normalize(accepted.record.challenge_category());
        if !category.is_empty() && !seen.used_categories.iter().any(|c| normalize(c) == category) {
            seen.used_categories.push(category);
        }

        Ok(json!({
            "move": accepted.record,
            "usedReferences": seen.used_references,
            "usedCategories": seen.used_categories,
            "repaired": accepted.repaired,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ScoreParams {
    response: TurnRecord,
    challenge: TurnRecord,
    #[serde(default)]
    difficulty: Difficulty,
}

/// Grades a response against the challenge it answers.
pub struct ChainScoreMode {
    protocol: TurnProtocol,
}

impl ChainScoreMode {
    pub fn new(protocol: TurnProtocol) -> Self {
        Self { protocol }
    }
}

impl ModeHandler for ChainScoreMode {
    fn mode(&self) -> &'static str {
        SCORE_MODE
    }

    fn strictness(&self) -> Strictness {
        Strictness::BestEffort
    }

    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError> {
        let params: ScoreParams = parse_params(SCORE_MODE, params)?;
        Ok(self
            .protocol
            .score_request(&params.response, &params.challenge, params.difficulty))
    }

    fn validate_response(&self, raw: &str, _params: &Value) -> Result<Validated, ServiceError> {
        let score = self.protocol.accept_score(raw);
        Ok(Validated {
            degraded: score.defaulted,
            value: json!(score),
            vocabulary_checks: 0,
        })
    }

    fn shape_response(&self, validated: Validated, _params: &Value) -> Result<Value, ServiceError> {
        Ok(validated.value)
    }
}

impl From<TurnError> for ServiceError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::MalformedTurn { reason, excerpt } => Self::MalformedTurn { reason, excerpt },
            TurnError::Upstream(e) => Self::Upstream(e),
        }
    }
}
