//! JeevesService - main entry point for mode invocation.
//!
//! One invocation is: look up the mode, build its model request, make a
//! single backend call, validate, shape. Nothing is retried here; every
//! failure surfaces to the caller, who decides whether to try again.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::backend::{LlmBackend, LlmError};
use crate::mode::ModeRegistry;
use crate::request::JeevesRequest;
use crate::response::JeevesResponse;
use crate::types::{ComputationCost, Strictness};
use crate::vocabulary::Violation;

/// Error types for the service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// No handler registered for the mode
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    /// Request validation error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend error
    #[error("Upstream error: {0}")]
    Upstream(#[from] LlmError),

    /// Model output used category/label pairs outside the taxonomy
    #[error("Model output used {} unknown principle label(s)", .0.len())]
    VocabularyViolation(Vec<Violation>),

    /// Model move is missing required fields
    #[error("Malformed turn: {reason}")]
    MalformedTurn { reason: String, excerpt: String },

    /// A validation-critical mode could not parse the model output
    #[error("Model output for {mode} could not be parsed")]
    DegradedOutput { mode: String },
}

impl ServiceError {
    /// Whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnknownMode(_) | Self::InvalidRequest(_) => false,
            Self::Upstream(e) => match e {
                LlmError::PaymentRequired => false,
                LlmError::RequestFailed { status, .. } => *status >= 500 || *status == 408,
                _ => true,
            },
            Self::VocabularyViolation(_) | Self::MalformedTurn { .. } | Self::DegradedOutput { .. } => {
                true
            }
        }
    }
}

/// Main entry point for Jeeves mode invocation.
pub struct JeevesService {
    backend: Arc<dyn LlmBackend>,
    registry: Arc<ModeRegistry>,
}

impl JeevesService {
    /// Create a new service over one backend and a mode registry.
    pub fn new(backend: Arc<dyn LlmBackend>, registry: ModeRegistry) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
        }
    }

    /// Identifier of the backing model.
    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Whether the backend currently answers.
    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Registered mode names.
    pub fn modes(&self) -> Vec<&str> {
        self.registry.modes()
    }

    /// Run one mode.
    pub async fn invoke(&self, request: JeevesRequest) -> Result<JeevesResponse, ServiceError> {
        let handler = self
            .registry
            .get(&request.mode)
            .ok_or_else(|| ServiceError::UnknownMode(request.mode.clone()))?;

        debug!(
            request_id = %request.request_id,
            mode = %request.mode,
            requester = %request.requester_id,
            "Processing request"
        );

        let completion_request = handler.build_request(&request.params)?;

        let start = Instant::now();
        let completion = self.backend.complete(completion_request).await.map_err(|e| {
            error!(mode = %request.mode, error = %e, "Upstream completion failed");
            ServiceError::Upstream(e)
        })?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let validated = handler.validate_response(&completion.content, &request.params)?;

        if validated.degraded {
            match handler.strictness() {
                Strictness::ValidationCritical => {
                    warn!(mode = %request.mode, "Refusing degraded output");
                    return Err(ServiceError::DegradedOutput {
                        mode: request.mode.clone(),
                    });
                }
                Strictness::BestEffort => {
                    warn!(mode = %request.mode, "Serving fallback for degraded output");
                }
            }
        }

        let degraded = validated.degraded;
        let mut cost = ComputationCost::from_usage(&completion.usage, duration_ms);
        cost.vocabulary_checks = validated.vocabulary_checks;

        let data = handler.shape_response(validated, &request.params)?;

        Ok(JeevesResponse::new(
            &request.request_id,
            &request.mode,
            self.backend.id(),
            data,
            degraded,
            cost,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::turn::TurnProtocol;
    use serde_json::json;

    fn service(backend: Arc<MockBackend>) -> JeevesService {
        JeevesService::new(backend, ModeRegistry::with_defaults(TurnProtocol::default()))
    }

    #[tokio::test]
    async fn test_best_effort_mode_serves_fallback() {
        let backend = Arc::new(MockBackend::default().with_response("no json here"));
        let response = service(backend.clone())
            .invoke(JeevesRequest::new("drills", json!({"topic": "Sanctuary"})))
            .await
            .unwrap();

        assert!(response.degraded);
        assert_eq!(response.data, json!({"drills": []}));
        assert_eq!(response.model, "mock-model");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_critical_mode_blocks_degraded_output() {
        let backend = Arc::new(MockBackend::default().with_response("prose only"));
        let err = service(backend)
            .invoke(JeevesRequest::new("principle-lens", json!({"reference": "John 1:29"})))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::DegradedOutput {
                mode: "principle-lens".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_vocabulary_violation_surfaces() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"applications":[{"principle":"(C6 - Divine Attributes)","insight":"x"}]}"#,
        ));
        let err = service(backend)
            .invoke(JeevesRequest::new("principle-lens", json!({"reference": "John 1:29"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::VocabularyViolation(ref v) if v[0].category == "C6"));
    }

    #[tokio::test]
    async fn test_unknown_mode_makes_no_backend_call() {
        let backend = Arc::new(MockBackend::default());
        let err = service(backend.clone())
            .invoke(JeevesRequest::new("sermon", json!({})))
            .await
            .unwrap_err();

        assert_eq!(err, ServiceError::UnknownMode("sermon".into()));
        assert!(!err.is_retryable());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_is_single_attempt() {
        let backend = Arc::new(
            MockBackend::default().then_fail(LlmError::RateLimited { retry_after_ms: Some(1000) }),
        );
        let err = service(backend.clone())
            .invoke(JeevesRequest::new("drills", json!({"topic": "Feasts"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Upstream(LlmError::RateLimited { .. })));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cost_records_usage_and_checks() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"applications":[{"principle":"(DR - Christ)","insight":"Behold the Lamb."}]}"#,
        ));
        let response = service(backend)
            .invoke(JeevesRequest::new("principle-lens", json!({"reference": "John 1:29"})))
            .await
            .unwrap();

        assert!(!response.degraded);
        assert_eq!(response.cost.vocabulary_checks, 1);
        assert!(response.cost.output_tokens > 0);
    }

    #[test]
    fn test_retryability() {
        assert!(!ServiceError::Upstream(LlmError::PaymentRequired).is_retryable());
        assert!(ServiceError::Upstream(LlmError::NetworkError("reset".into())).is_retryable());
        assert!(!ServiceError::Upstream(LlmError::RequestFailed {
            status: 400,
            message: String::new()
        })
        .is_retryable());
        assert!(ServiceError::MalformedTurn {
            reason: "r".into(),
            excerpt: "e".into()
        }
        .is_retryable());
    }
}
