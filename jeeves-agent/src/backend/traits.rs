//! Core traits for LLM backends.
//!
//! This module defines the `LlmBackend` trait - the single seam between the
//! study protocols and whatever text-generation service sits upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for LLM operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Backend is not available
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered with a non-success status
    #[error("Request failed with HTTP {status}: {message}")]
    RequestFailed { status: u16, message: String },

    /// Upstream account is out of credits
    #[error("Upstream payment required")]
    PaymentRequired,

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Content was filtered
    #[error("Content filtered: {reason}")]
    ContentFiltered { reason: String },

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Core trait for LLM backends.
///
/// Implementations make exactly one upstream round-trip per `complete`
/// call and never retry internally; retry policy belongs to the caller.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend identifier (e.g., model name).
    fn id(&self) -> &str;

    /// Check if the backend is currently available.
    async fn is_available(&self) -> bool;

    /// Generate a completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Request for LLM completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt (optional)
    pub system_prompt: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Temperature (0.0-2.0, default 1.0)
    pub temperature: Option<f32>,
    /// Request structured output format
    pub response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    /// Create a new request with a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            ..Default::default()
        }
    }

    /// Add a system prompt.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }

    /// Request JSON output.
    pub fn with_json_output(mut self) -> Self {
        self.response_format = Some(ResponseFormat {
            format_type: ResponseFormatType::Json,
        });
        self
    }

    /// Whether JSON output was requested.
    pub fn wants_json(&self) -> bool {
        self.response_format
            .as_ref()
            .map(|f| f.format_type != ResponseFormatType::Text)
            .unwrap_or(false)
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Wire name used by OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Response from LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Token usage
    pub usage: Usage,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of response
    Stop,
    /// Hit max tokens limit
    Length,
    /// Content was filtered
    ContentFilter,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl Usage {
    /// Get total tokens.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Format for structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Type of format
    pub format_type: ResponseFormatType,
}

/// Type of response format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatType {
    /// Plain text
    Text,
    /// JSON object
    Json,
}
