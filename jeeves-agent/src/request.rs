//! Jeeves request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A request to run one mode.
///
/// Clients send `{"mode": "...", "params": {...}}`; the remaining fields
/// are filled in server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JeevesRequest {
    /// Unique request identifier
    #[serde(default = "new_request_id")]
    pub request_id: String,
    /// Registered mode name, e.g. `chain-move`
    pub mode: String,
    /// Mode-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
    /// Who is making the request
    #[serde(default)]
    pub requester_id: String,
    /// When the request was made
    #[serde(default = "Utc::now")]
    pub requested_at: DateTime<Utc>,
}

impl JeevesRequest {
    /// Create a new request.
    pub fn new(mode: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            request_id: new_request_id(),
            mode: mode.into(),
            params,
            requester_id: String::new(),
            requested_at: Utc::now(),
        }
    }

    /// Set the requester.
    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = requester_id.into();
        self
    }
}
