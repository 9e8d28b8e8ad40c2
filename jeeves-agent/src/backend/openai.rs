//! OpenAI-compatible LLM backend.
//!
//! Works with any OpenAI-compatible chat-completions API (OpenAI, vLLM,
//! Ollama, LocalAI, gateway proxies). One `complete` call is one HTTP
//! round-trip; upstream failures are mapped onto [`LlmError`] and returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::*;

/// Default request timeout for upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible backend.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend with the default timeout.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        Self::with_timeout(base_url, model, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a new backend whose requests give up after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }

    /// Map a non-success upstream response onto an error, keeping the body
    /// out of anything but `RequestFailed`.
    async fn error_from_response(response: Response) -> LlmError {
        let status = response.status();

        match status {
            StatusCode::PAYMENT_REQUIRED => LlmError::PaymentRequired,
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_ms = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(|secs| secs * 1000);
                LlmError::RateLimited { retry_after_ms }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                LlmError::RequestFailed {
                    status: status.as_u16(),
                    message: body.chars().take(500).collect(),
                }
            }
        }
    }
}

/// OpenAI chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatRequest>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormatRequest {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// OpenAI chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageResponse>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        request
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: MessageRole::System.as_str(),
                content: system.clone(),
            });
        }

        for msg in &request.messages {
            messages.push(ChatMessage {
                role: msg.role.as_str(),
                content: msg.content.clone(),
            });
        }

        let response_format = request.response_format.as_ref().map(|rf| ResponseFormatRequest {
            format_type: match rf.format_type {
                ResponseFormatType::Json => "json_object",
                ResponseFormatType::Text => "text",
            },
        });

        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            response_format,
            stream: false,
        };

        let mut http_request = self.client.post(self.chat_completions_url());

        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        debug!(model = %self.model, "Sending chat completion");

        let response = http_request
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            warn!(model = %self.model, error = %err, "Upstream completion failed");
            return Err(err);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("No choices in response".to_string()))?;

        let content = choice.message.content.unwrap_or_default();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(LlmError::ContentFiltered {
                reason: "upstream content filter".to_string(),
            });
        }

        let usage = chat_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OpenAiBackend {
        OpenAiBackend::new(format!("{}/v1/", server.uri()), "study-model", Some("sk-test".into()))
            .unwrap()
    }

    #[test]
    fn test_creation() {
        let backend = OpenAiBackend::new("http://localhost:8000/v1", "llama-3.3-70b", None).unwrap();
        assert_eq!(backend.id(), "llama-3.3-70b");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header_matcher("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "content": "{\"drills\":[]}" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .complete(CompletionRequest::user("Give me drills").with_json_output())
            .await
            .unwrap();

        assert_eq!(response.content, "{\"drills\":[]}");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total(), 16);
    }

    #[tokio::test]
    async fn test_payment_required_maps_to_402() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(402).set_body_string("out of credits"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap_err();

        assert_eq!(err, LlmError::PaymentRequired);
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap_err();

        assert_eq!(err, LlmError::RateLimited { retry_after_ms: Some(7000) });
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LlmError::RequestFailed {
                status: 503,
                message: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_availability_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        assert!(backend_for(&server).is_available().await);

        let dead = OpenAiBackend::with_timeout(
            "http://127.0.0.1:9/v1",
            "m",
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(!dead.is_available().await);
    }
}
