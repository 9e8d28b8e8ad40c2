//! Health check endpoints
//!
//! - /health, /healthz - liveness, 200 whenever the process is serving
//! - /ready, /readyz - readiness, 200 only when the LLM backend answers

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::json_response;
use crate::server::AppState;

/// Liveness body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the gateway started
    pub uptime: u64,
    pub taxonomy_version: &'static str,
    /// `memory` or `mongodb`
    pub rate_limit_store: &'static str,
}

/// Readiness body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        taxonomy_version: palace::TAXONOMY_VERSION,
        rate_limit_store: state.limiter.store_name(),
    }
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

pub async fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    let backend = state.service.backend_id().to_string();

    if state.service.is_available().await {
        json_response(
            StatusCode::OK,
            &ReadyResponse {
                ready: true,
                backend,
                error: None,
            },
        )
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &ReadyResponse {
                ready: false,
                backend,
                error: Some("LLM backend is not reachable".to_string()),
            },
        )
    }
}

/// Version, model and registered modes
pub fn version_info(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model": state.service.backend_id(),
            "modes": state.service.modes(),
            "taxonomyVersion": palace::TAXONOMY_VERSION,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::ratelimit::{RateLimitConfig, RateLimiter};
    use clap::Parser;
    use http_body_util::BodyExt;
    use jeeves_agent::backend::MockBackend;
    use jeeves_agent::{JeevesService, ModeRegistry, TurnProtocol};
    use std::sync::Arc;

    fn state(available: bool) -> AppState {
        let backend = Arc::new(MockBackend::default().with_available(available));
        let service = JeevesService::new(backend, ModeRegistry::with_defaults(TurnProtocol::default()));
        let args = Args::try_parse_from(["jeeves-gateway"]).unwrap();
        AppState::new(args, service, RateLimiter::in_memory(RateLimitConfig::default()))
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_always_ok() {
        let response = health_check(&state(false));
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["taxonomyVersion"], palace::TAXONOMY_VERSION);
        assert_eq!(body["rateLimitStore"], "memory");
    }

    #[tokio::test]
    async fn test_ready_follows_backend() {
        assert_eq!(readiness_check(&state(true)).await.status(), StatusCode::OK);

        let response = readiness_check(&state(false)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["ready"], false);
    }

    #[tokio::test]
    async fn test_version_lists_modes() {
        let body = body_json(version_info(&state(true))).await;
        let modes = body["modes"].as_array().unwrap();
        assert!(modes.iter().any(|m| m == "chain-move"));
    }
}
