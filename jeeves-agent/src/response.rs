//! Jeeves response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ComputationCost;

/// Successful result of a mode invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JeevesResponse {
    /// Unique response identifier
    pub response_id: String,
    /// Request ID this responds to
    pub request_id: String,
    /// Mode that handled the request
    pub mode: String,
    /// Mode-specific payload
    pub data: serde_json::Value,
    /// True when a best-effort mode served its fallback
    pub degraded: bool,
    /// Model that produced the content
    pub model: String,
    /// Computation cost
    pub cost: ComputationCost,
    /// When the response was generated
    pub responded_at: DateTime<Utc>,
}

impl JeevesResponse {
    /// Create a response for `request_id`.
    pub fn new(
        request_id: impl Into<String>,
        mode: impl Into<String>,
        model: impl Into<String>,
        data: serde_json::Value,
        degraded: bool,
        cost: ComputationCost,
    ) -> Self {
        Self {
            response_id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            mode: mode.into(),
            data,
            degraded,
            model: model.into(),
            cost,
            responded_at: Utc::now(),
        }
    }
}
