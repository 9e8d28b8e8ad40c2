//! Jeeves Agent - LLM orchestration for study protocols
//!
//! Turns a stateless, freeform text model into predictable, rule-bound
//! protocols:
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Tolerant structured-output parsing with documented fallbacks
//! - A closed-vocabulary hallucination gate over the palace taxonomy
//! - Caller-held conversation state for multi-turn sessions
//! - A challenge/response turn protocol for the chain game
//! - A registry of mode handlers selected by the request's `mode`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             JeevesService               │
//! │  (one backend call per invocation)      │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌──────────────┐
//! │ LlmBackend  │       │ ModeRegistry │
//! │ (OpenAI/    │       │  → handlers  │
//! │  Mock)      │       │              │
//! └─────────────┘       └──────┬───────┘
//!                              ▼
//!        ResponseParser · VocabularyValidator ·
//!        ConversationStore · TurnProtocol
//! ```

pub mod backend;
pub mod conversation;
pub mod mode;
pub mod parser;
pub mod request;
pub mod response;
pub mod service;
pub mod turn;
pub mod types;
pub mod vocabulary;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use conversation::{ConversationState, ConversationStore, TurnLogEntry};
pub use mode::{ModeHandler, ModeRegistry};
pub use parser::{Parsed, ResponseParser};
pub use request::JeevesRequest;
pub use response::JeevesResponse;
pub use service::{JeevesService, ServiceError};
pub use turn::{Difficulty, Score, TurnError, TurnProtocol, TurnRecord};
pub use types::*;
pub use vocabulary::{Validation, VocabularyValidator, Violation};
