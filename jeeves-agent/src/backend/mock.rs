//! Mock LLM backend for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::*;

/// Mock backend for testing.
///
/// Answers from a scripted queue first, then falls back to a fixed
/// response. Every request is recorded so tests can inspect prompts.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the fallback response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Queue a response to be returned before the fallback.
    pub fn then_respond(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    /// Queue an error to be returned before the fallback.
    pub fn then_fail(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests().pop()
    }

    fn push(&self, item: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    fn next_scripted(&self) -> Option<Result<String, LlmError>> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();

        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }

        let content = match self.next_scripted() {
            Some(item) => item?,
            None => self.response_content.clone(),
        };

        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
