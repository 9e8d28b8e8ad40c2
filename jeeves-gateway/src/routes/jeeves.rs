//! Orchestration endpoint
//!
//! `POST /jeeves` with `{"mode": "...", "params": {...}}`. The quota check
//! runs before the body is even parsed, so a flood of garbage still counts.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, RETRY_AFTER};
use hyper::{Response, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use jeeves_agent::{JeevesRequest, LlmError, ServiceError};

use crate::auth::Identity;
use crate::ratelimit::Decision;
use crate::routes::{error_response, json_response};
use crate::server::AppState;

/// Capability name the quota is counted under
pub const CAPABILITY: &str = "jeeves";

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Handle one orchestration request from `identity`
pub async fn handle_jeeves(state: &AppState, identity: &Identity, body: &[u8]) -> Response<Full<Bytes>> {
    let limiter = &state.limiter;

    let decision = if identity.is_anonymous() && !limiter.config().limit_anonymous {
        None
    } else {
        let decision = limiter.admit(&identity.key(), CAPABILITY).await;
        if !decision.allowed {
            warn!(
                identity = %identity,
                capability = CAPABILITY,
                retry_after = decision.retry_after_secs,
                "Quota exceeded"
            );
            return quota_exceeded_response(&decision);
        }
        Some(decision)
    };

    let request: JeevesRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request body: {}", e));
        }
    };
    let request = request.with_requester(identity.key());

    info!(
        identity = %identity,
        mode = %request.mode,
        request_id = %request.request_id,
        "Invoking mode"
    );

    let mut response = match state.service.invoke(request).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => service_error_response(&e),
    };

    if let Some(decision) = decision {
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    }

    response
}

fn quota_exceeded_response(decision: &Decision) -> Response<Full<Bytes>> {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &json!({
            "error": "Rate limit exceeded",
            "retryAfter": decision.retry_after_secs,
        }),
    );

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
    response
}

/// Map a service failure onto a client-facing status and body
fn service_error_response(error: &ServiceError) -> Response<Full<Bytes>> {
    let retryable = error.is_retryable();

    match error {
        ServiceError::UnknownMode(_) | ServiceError::InvalidRequest(_) => {
            error_response(StatusCode::BAD_REQUEST, &error.to_string())
        }

        // Provider bodies are never echoed back.
        ServiceError::Upstream(LlmError::PaymentRequired) => json_response(
            StatusCode::PAYMENT_REQUIRED,
            &json!({ "error": "Upstream model service requires payment", "retryable": retryable }),
        ),
        ServiceError::Upstream(_) => json_response(
            StatusCode::BAD_GATEWAY,
            &json!({ "error": "Upstream model service failed", "retryable": retryable }),
        ),

        ServiceError::VocabularyViolation(violations) => {
            warn!(count = violations.len(), "Vocabulary violation in model output");
            json_response(
                StatusCode::BAD_REQUEST,
                &json!({
                    "error": error.to_string(),
                    "retryable": retryable,
                    "invalidPrinciples": violations,
                }),
            )
        }

        ServiceError::MalformedTurn { reason, excerpt } => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({
                "error": format!("Malformed turn: {}", reason),
                "retryable": retryable,
                "excerpt": excerpt,
            }),
        ),

        ServiceError::DegradedOutput { .. } => json_response(
            StatusCode::BAD_GATEWAY,
            &json!({ "error": error.to_string(), "retryable": retryable }),
        ),
    }
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
    use std::time::Duration;

    const COMMENTARY: &str = "Ruth clings to Naomi and to Naomi's God, a Gentile grafted into Israel. \
        Her loyalty pictures the church joined to Christ. The kinsman-redeemer waits in the next chapter.";

    fn state_with(backend: Arc<MockBackend>, config: RateLimitConfig) -> AppState {
        let service = JeevesService::new(backend, ModeRegistry::with_defaults(TurnProtocol::default()));
        let args = Args::try_parse_from(["jeeves-gateway"]).unwrap();
        AppState::new(args, service, RateLimiter::in_memory(config))
    }

    fn state(backend: Arc<MockBackend>) -> AppState {
        state_with(backend, RateLimitConfig::default())
    }

    fn user() -> Identity {
        Identity::User("U".into())
    }

    fn anonymous() -> Identity {
        Identity::Anonymous("198.51.100.4".parse().unwrap())
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn drills_body() -> Vec<u8> {
        json!({"mode": "drills", "params": {"topic": "Sanctuary"}})
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_success_carries_rate_limit_headers() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"drills":[{"title":"Laver","instructions":"Wash and look."}]}"#,
        ));
        let response = handle_jeeves(&state(backend), &user(), &drills_body()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "99");

        let body = body_json(response).await;
        assert_eq!(body["mode"], "drills");
        assert_eq!(body["degraded"], false);
        assert_eq!(body["data"]["drills"][0]["title"], "Laver");
    }

    #[tokio::test]
    async fn test_quota_exceeded_after_max() {
        let backend = Arc::new(MockBackend::default().with_response(r#"{"drills":[]}"#));
        let state = state_with(
            backend.clone(),
            RateLimitConfig {
                max_requests: 3,
                ..Default::default()
            },
        );

        for _ in 0..3 {
            let response = handle_jeeves(&state, &user(), &drills_body()).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = handle_jeeves(&state, &user(), &drills_body()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

        let retry_after: u64 = response.headers()[RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 3500 && retry_after <= 3600);

        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], retry_after);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_anonymous_limited_by_default() {
        let backend = Arc::new(MockBackend::default().with_response(r#"{"drills":[]}"#));
        let state = state_with(
            backend,
            RateLimitConfig {
                max_requests: 1,
                ..Default::default()
            },
        );

        assert_eq!(handle_jeeves(&state, &anonymous(), &drills_body()).await.status(), StatusCode::OK);
        assert_eq!(
            handle_jeeves(&state, &anonymous(), &drills_body()).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        // A different caller has its own counter.
        assert_eq!(handle_jeeves(&state, &user(), &drills_body()).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_for_shares_peer_quota() {
        use crate::auth::{resolve_identity, FORWARDED_FOR};
        use hyper::header::HeaderMap;
        use std::net::SocketAddr;

        let backend = Arc::new(MockBackend::default().with_response(r#"{"drills":[]}"#));
        let state = state_with(
            backend.clone(),
            RateLimitConfig {
                max_requests: 1,
                ..Default::default()
            },
        );
        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();

        let mut admitted = 0;
        for i in 0..5 {
            let mut headers = HeaderMap::new();
            headers.insert(FORWARDED_FOR, HeaderValue::from_str(&format!("10.9.9.{}", i)).unwrap());
            let identity = resolve_identity(&headers, peer, state.jwt.as_ref(), &state.args.trusted_proxies);
            assert_eq!(identity.key(), "anon:198.51.100.4");

            let status = handle_jeeves(&state, &identity, &drills_body()).await.status();
            if status == StatusCode::OK {
                admitted += 1;
            } else {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_exposed_to_browsers() {
        let backend = Arc::new(MockBackend::default().with_response(r#"{"drills":[]}"#));
        let state = state_with(
            backend,
            RateLimitConfig {
                max_requests: 1,
                ..Default::default()
            },
        );

        let ok = handle_jeeves(&state, &user(), &drills_body()).await;
        let limited = handle_jeeves(&state, &user(), &drills_body()).await;
        for response in [ok, limited] {
            let exposed = response.headers()["access-control-expose-headers"].to_str().unwrap();
            for name in ["Retry-After", "X-RateLimit-Limit", "X-RateLimit-Remaining"] {
                assert!(exposed.contains(name), "{} not exposed", name);
            }
        }
    }

    #[tokio::test]
    async fn test_anonymous_bypass_when_disabled() {
        let backend = Arc::new(MockBackend::default().with_response(r#"{"drills":[]}"#));
        let state = state_with(
            backend,
            RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 1,
                limit_anonymous: false,
            },
        );

        for _ in 0..3 {
            let response = handle_jeeves(&state, &anonymous(), &drills_body()).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_bad_body_is_400_without_backend_call() {
        let backend = Arc::new(MockBackend::default());
        let response = handle_jeeves(&state(backend.clone()), &user(), b"{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_mode_is_400() {
        let body = json!({"mode": "sermon"}).to_string();
        let response = handle_jeeves(&state(Arc::new(MockBackend::default())), &user(), body.as_bytes()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("sermon"));
    }

    #[tokio::test]
    async fn test_vocabulary_violation_is_400_with_diagnostics() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"applications":[{"principle":"(C6 - Divine Attributes)","insight":"x"}]}"#,
        ));
        let body = json!({"mode": "principle-lens", "params": {"reference": "John 1:29"}}).to_string();
        let response = handle_jeeves(&state(backend), &user(), body.as_bytes()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["retryable"], true);
        let violation = &body["invalidPrinciples"][0];
        assert_eq!(violation["category"], "C6");
        assert_eq!(violation["foundLabel"], "Divine Attributes");
        assert_eq!(
            violation["allowedLabels"],
            json!(["Prophecy", "Parable", "Epistle", "History", "Gospel", "Poetry"])
        );
    }

    #[tokio::test]
    async fn test_payment_required_is_402() {
        let backend = Arc::new(MockBackend::default().then_fail(LlmError::PaymentRequired));
        let response = handle_jeeves(&state(backend), &user(), &drills_body()).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body_json(response).await["retryable"], false);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_sanitized_502() {
        let backend = Arc::new(MockBackend::default().then_fail(LlmError::RequestFailed {
            status: 500,
            message: "internal stack trace sk-secret".into(),
        }));
        let response = handle_jeeves(&state(backend), &user(), &drills_body()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert!(!body.to_string().contains("sk-secret"));
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_malformed_turn_is_500_with_excerpt() {
        let backend = Arc::new(
            MockBackend::default().with_response(r#"{"reference":"Ruth 1:16","challenge":"Palace Rooms"}"#),
        );
        let body = json!({"mode": "chain-move", "params": {"availableCategories": ["Palace Rooms"]}}).to_string();
        let response = handle_jeeves(&state(backend), &user(), body.as_bytes()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["retryable"], true);
        assert!(body["excerpt"].as_str().unwrap().contains("Ruth 1:16"));
    }

    #[tokio::test]
    async fn test_degraded_validation_critical_is_502() {
        let backend = Arc::new(MockBackend::default().with_response("I'd rather not say."));
        let body = json!({"mode": "principle-lens", "params": {"reference": "John 1:29"}}).to_string();
        let response = handle_jeeves(&state(backend), &user(), body.as_bytes()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_chain_move_repairs_vague_challenge() {
        let backend = Arc::new(MockBackend::default().with_response(
            json!({"reference": "Ruth 1:16", "commentary": COMMENTARY, "challenge": "Books of the Bible"})
                .to_string(),
        ));
        let body = json!({"mode": "chain-move", "params": {"availableCategories": ["Books of the Bible"]}})
            .to_string();
        let response = handle_jeeves(&state(backend), &user(), body.as_bytes()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let challenge = body["data"]["move"]["challenge"].as_str().unwrap();
        let target = challenge.strip_prefix("Books of the Bible - ").unwrap();
        assert!(palace::targets::BOOKS.contains(&target));
        assert_eq!(body["data"]["repaired"], true);
    }
}
