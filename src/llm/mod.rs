//! Text generation capability
//!
//! Every call may fail; callers in the pipeline treat an `Err` as recoverable and
//! substitute their documented fallback.

mod openai;

pub use openai::OpenAiClient;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Client initialization failed: {0}")]
    InitializationError(String),

    #[error("Request failed: {0}")]
    RequestError(String),

    #[error("Service returned {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Empty completion")]
    EmptyCompletion,
}

/// Token counts reported by the generation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A completed generation
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            usage,
        }
    }
}

/// Trait for text generation backends
pub trait GenerationClient: Send + Sync {
    /// Send a single-turn prompt and return the completion text
    fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion, LlmError>;

    /// Model identifier, used for usage accounting
    fn model_name(&self) -> &str;
}
