//! Common types for the jeeves-agent crate.

use serde::{Deserialize, Serialize};

use crate::backend::Usage;

/// Cost information for one orchestrated call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationCost {
    /// Number of input tokens processed
    pub input_tokens: u32,
    /// Number of output tokens generated
    pub output_tokens: u32,
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
    /// Number of vocabulary checks performed
    pub vocabulary_checks: u32,
}

impl ComputationCost {
    pub fn from_usage(usage: &Usage, processing_time_ms: u64) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            processing_time_ms,
            vocabulary_checks: 0,
        }
    }
}

/// How a mode reacts when model output cannot be trusted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Serve the documented fallback and flag the response degraded
    BestEffort,
    /// Never serve substituted or unverified content; surface an error
    ValidationCritical,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::ValidationCritical => "validation_critical",
        }
    }
}
