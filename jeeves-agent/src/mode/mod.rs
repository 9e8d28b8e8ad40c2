//! Mode handlers and their registry.
//!
//! Each mode is one [`ModeHandler`]: it builds the model request, checks
//! what comes back, and shapes the payload returned to the caller. The
//! [`ModeRegistry`] maps the `mode` string of an inbound request to its
//! handler.

pub mod chain;
pub mod drills;
pub mod principle_lens;
pub mod registry;
pub mod study_session;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::CompletionRequest;
use crate::service::ServiceError;
use crate::types::Strictness;

pub use chain::{ChainMoveMode, ChainScoreMode};
pub use drills::DrillsMode;
pub use principle_lens::PrincipleLensMode;
pub use registry::ModeRegistry;
pub use study_session::StudySessionMode;

/// Model output after a handler has checked it.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub value: Value,
    /// True when the value is a substituted fallback
    pub degraded: bool,
    /// Vocabulary passes run on the raw text
    pub vocabulary_checks: u32,
}

impl Validated {
    pub fn clean(value: Value) -> Self {
        Self {
            value,
            degraded: false,
            vocabulary_checks: 0,
        }
    }

    pub fn with_vocabulary_check(mut self) -> Self {
        self.vocabulary_checks += 1;
        self
    }
}

/// One protocol the service can run.
pub trait ModeHandler: Send + Sync {
    /// Name clients put in the `mode` field.
    fn mode(&self) -> &'static str;

    fn strictness(&self) -> Strictness;

    /// Turn request params into a model request.
    fn build_request(&self, params: &Value) -> Result<CompletionRequest, ServiceError>;

    /// Parse and gate raw model text.
    fn validate_response(&self, raw: &str, params: &Value) -> Result<Validated, ServiceError>;

    /// Produce the payload returned to the caller.
    fn shape_response(&self, validated: Validated, params: &Value) -> Result<Value, ServiceError>;
}

/// Deserialize mode params, treating a missing body as `{}`.
pub(crate) fn parse_params<T: DeserializeOwned>(mode: &str, params: &Value) -> Result<T, ServiceError> {
    let value = match params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| ServiceError::InvalidRequest(format!("invalid params for {}: {}", mode, e)))
}

/// Reject blank required strings.
pub(crate) fn require_text(mode: &str, field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(format!(
            "{} requires a non-empty {}",
            mode, field
        )));
    }
    Ok(())
}
