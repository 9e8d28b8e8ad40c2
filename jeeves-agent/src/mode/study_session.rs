//! `study-session`: multi-turn guided study from an anchor reference.
//!
//! The caller owns the [`ConversationState`] and sends it back each turn.
//! The prose reply is vocabulary-gated before any state is advanced.

use std::sync::Arc;

use palace::PromptAssembler;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{parse_params, require_text, ModeHandler, Validated};
use crate::backend::{CompletionRequest, Message, MessageRole};
use crate::conversation::{normalize, ConversationState, ConversationStore};
use crate::parser::strip_code_fences;
use crate::service::ServiceError;
use crate::types::Strictness;
use crate::vocabulary::VocabularyValidator;

pub const MODE: &str = "study-session";

/// Turns of history replayed to the model.
const HISTORY_TURNS: usize = 12;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    #[serde(default)]
    anchor: String,
    question: Option<String>,
    state: Option<ConversationState>,
}

impl SessionParams {
    fn question(&self) -> Option<&str> {
        self.question.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Prior state, or a fresh one rooted at the anchor.
    fn state(&self) -> ConversationState {
        match &self.state {
            Some(state) if !state.anchor.trim().is_empty() => state.clone(),
            Some(state) => ConversationState {
                anchor: normalize(&self.anchor),
                ..state.clone()
            },
            None => ConversationState::new(self.anchor.as_str()),
        }
    }

    fn validate(&self) -> Result<(), ServiceError> {
        let has_state_anchor = self
            .state
            .as_ref()
            .is_some_and(|s| !s.anchor.trim().is_empty());
        if has_state_anchor {
            return Ok(());
        }
        require_text(MODE, "anchor", &self.anchor)
    }
}

pub struct StudySessionMode {
    validator: Arc<VocabularyValidator>,
    store: Arc<ConversationStore>,
}

impl StudySessionMode {
    pub fn new(validator: Arc<VocabularyValidator>, store: Arc<ConversationStore>) -> Self {
        Self { validator, store }
    }
}

impl ModeHandler for StudySessionMode {
    fn mode(&self) -> &'static str {
        MODE
    }

    fn strictness(&self) -> Strictness {
        Strictness::ValidationCritical
    }

    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError> {
        let params: SessionParams = parse_params(MODE, params)?;
        params.validate()?;
        let state = params.state();

        let mut system = String::from(
            "You are Jeeves, a patient Bible study guide. Answer in a few short paragraphs of prose. \
             Cite verses as Book C:V and rooms by their codes.\n\n",
        );
        system.push_str(&PromptAssembler::build_vocabulary_prompt(palace::taxonomy()));
        system.push_str(&format!("\nThe session is anchored on {}.\n", state.anchor));
        system.push_str(&PromptAssembler::build_avoid_prompt(
            &state.used_references,
            &state.used_categories,
        ));

        let mut request = CompletionRequest::default()
            .with_system(system)
            .with_temperature(0.7);

        let skip = state.turn_log.len().saturating_sub(HISTORY_TURNS);
        for entry in state.turn_log.iter().skip(skip) {
            request = request.with_message(Message {
                role: entry.role,
                content: entry.text.clone(),
            });
        }

        let prompt = match params.question() {
            Some(question) => question.to_string(),
            None if state.turn_log.is_empty() => format!("Begin a study of {}.", state.anchor),
            None => "Continue the study with a new angle.".to_string(),
        };

        Ok(request.with_message(Message::user(prompt)))
    }

    fn validate_response(&self, raw: &str, _params: &Value) -> Result<Validated, ServiceError> {
        let check = self.validator.validate(raw);
        if !check.ok {
            warn!(mode = MODE, violations = check.violations.len(), "Vocabulary violation");
            return Err(ServiceError::VocabularyViolation(check.violations));
        }

        let reply = strip_code_fences(raw);
        Ok(Validated {
            degraded: reply.is_empty(),
            value: Value::String(reply),
            vocabulary_checks: 1,
        })
    }

    fn shape_response(&self, validated: Validated, params: &Value) -> Result<Value, ServiceError> {
        let params: SessionParams = parse_params(MODE, params)?;
        let reply = validated.value.as_str().unwrap_or_default().to_string();

        let mut state = params.state();
        if let Some(question) = params.question() {
            state = state.with_turn(MessageRole::User, question);
        }
        let state = self
            .store
            .advance(&state, &reply)
            .with_turn(MessageRole::Assistant, reply.as_str());

        Ok(json!({ "reply": reply, "state": state }))
    }
}
