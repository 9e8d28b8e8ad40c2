//! `principle-lens`: read a passage through palace principles.
//!
//! Validation-critical. Every `(CODE - Label)` tag in the model text must
//! exist in the taxonomy, and the payload must parse; otherwise the caller
//! gets a retryable error instead of content.

use std::sync::Arc;

use palace::PromptAssembler;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::{parse_params, require_text, ModeHandler, Validated};
use crate::backend::CompletionRequest;
use crate::parser::ResponseParser;
use crate::service::ServiceError;
use crate::types::Strictness;
use crate::vocabulary::VocabularyValidator;

pub const MODE: &str = "principle-lens";

#[derive(Debug, Deserialize)]
struct LensParams {
    #[serde(default)]
    reference: String,
    passage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Tag such as `(DR - Christ)`
    pub principle: String,
    pub insight: String,
}

#[derive(Debug, Default, Deserialize)]
struct Lens {
    applications: Vec<Application>,
}

pub struct PrincipleLensMode {
    validator: Arc<VocabularyValidator>,
}

impl PrincipleLensMode {
    pub fn new(validator: Arc<VocabularyValidator>) -> Self {
        Self { validator }
    }
}

impl ModeHandler for PrincipleLensMode {
    fn mode(&self) -> &'static str {
        MODE
    }

    fn strictness(&self) -> Strictness {
        Strictness::ValidationCritical
    }

    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError> {
        let params: LensParams = parse_params(MODE, params)?;
        require_text(MODE, "reference", &params.reference)?;

        let mut system = PromptAssembler::build_vocabulary_prompt(palace::taxonomy());
        system.push_str(
            "\nApply palace principles to the passage. Reply with ONLY a JSON object:\n\
             {\"applications\": [{\"principle\": \"(CODE - Label)\", \"insight\": \"...\"}]}\n",
        );

        let mut user = format!("Reference: {}", params.reference.trim());
        if let Some(passage) = params.passage.as_deref().filter(|p| !p.trim().is_empty()) {
            user.push_str(&format!("\n\nPassage:\n{}", passage.trim()));
        }

        Ok(CompletionRequest::user(user)
            .with_system(system)
            .with_temperature(0.4)
            .with_json_output())
    }

    fn validate_response(&self, raw: &str, _params: &Value) -> Result<Validated, ServiceError> {
        let check = self.validator.validate(raw);
        if !check.ok {
            warn!(mode = MODE, violations = check.violations.len(), "Vocabulary violation");
            return Err(ServiceError::VocabularyViolation(check.violations));
        }

        let parsed = ResponseParser::parse(raw, Lens::default());
        Ok(Validated {
            value: json!({ "applications": parsed.value.applications }),
            degraded: parsed.degraded,
            vocabulary_checks: 1,
        })
    }

    fn shape_response(&self, validated: Validated, params: &Value) -> Result<Value, ServiceError> {
        let params: LensParams = parse_params(MODE, params)?;
        Ok(json!({
            "reference": params.reference.trim(),
            "applications": validated.value["applications"],
            "taxonomyVersion": self.validator.taxonomy_version(),
        }))
    }
}
