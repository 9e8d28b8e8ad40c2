//! `drills`: short memory exercises on a topic. Best-effort.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_params, require_text, ModeHandler, Validated};
use crate::backend::CompletionRequest;
use crate::parser::ResponseParser;
use crate::service::ServiceError;
use crate::types::Strictness;

pub const MODE: &str = "drills";
const DEFAULT_COUNT: usize = 5;
const MAX_COUNT: usize = 10;

#[derive(Debug, Deserialize)]
struct DrillParams {
    #[serde(default)]
    topic: String,
    count: Option<usize>,
}

impl DrillParams {
    fn count(&self) -> usize {
        self.count.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub title: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DrillSet {
    drills: Vec<Drill>,
}

pub struct DrillsMode;

impl DrillsMode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DrillsMode {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeHandler for DrillsMode {
    fn mode(&self) -> &'static str {
        MODE
    }

    fn strictness(&self) -> Strictness {
        Strictness::BestEffort
    }

    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError> {
        let params: DrillParams = parse_params(MODE, params)?;
        require_text(MODE, "topic", &params.topic)?;

        let system = "You write short Bible memory drills. Reply with ONLY a JSON object:\n\
             {\"drills\": [{\"title\": \"...\", \"instructions\": \"...\", \"reference\": \"Book C:V\"}]}";

        Ok(CompletionRequest::user(format!(
            "Write {} drills on: {}",
            params.count(),
            params.topic.trim()
        ))
        .with_system(system)
        .with_temperature(0.8)
        .with_json_output())
    }

    fn validate_response(&self, raw: &str, _params: &Value) -> Result<Validated, ServiceError> {
        let parsed = ResponseParser::parse(raw, DrillSet::default());
        Ok(Validated {
            value: json!({ "drills": parsed.value.drills }),
            degraded: parsed.degraded,
            vocabulary_checks: 0,
        })
    }

    fn shape_response(&self, validated: Validated, params: &Value) -> Result<Value, ServiceError> {
        let params: DrillParams = parse_params(MODE, params)?;
        let mut value = validated.value;

        if let Some(drills) = value.get_mut("drills").and_then(Value::as_array_mut) {
            drills.truncate(params.count());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_required() {
        let err = DrillsMode::new().build_request(&json!({})).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn test_count_is_clamped_in_prompt() {
        let request = DrillsMode::new()
            .build_request(&json!({"topic": "Sanctuary", "count": 50}))
            .unwrap();
        assert!(request.messages[0].content.starts_with("Write 10 drills"));
        assert!(request.wants_json());
    }

    #[test]
    fn test_garbage_serves_empty_fallback() {
        let validated = DrillsMode::new()
            .validate_response("I'm sorry, I can't do that.", &Value::Null)
            .unwrap();
        assert!(validated.degraded);
        assert_eq!(validated.value, json!({"drills": []}));
    }

    #[test]
    fn test_shape_truncates_to_count() {
        let mode = DrillsMode::new();
        let raw = json!({"drills": [
            {"title": "A", "instructions": "a"},
            {"title": "B", "instructions": "b", "reference": "Ruth 1:16"},
            {"title": "C", "instructions": "c"}
        ]})
        .to_string();
        let params = json!({"topic": "Ruth", "count": 2});

        let validated = mode.validate_response(&raw, &params).unwrap();
        assert!(!validated.degraded);

        let shaped = mode.shape_response(validated, &params).unwrap();
        assert_eq!(shaped["drills"].as_array().unwrap().len(), 2);
        assert_eq!(shaped["drills"][1]["reference"], "Ruth 1:16");
    }
}
