//! Text completion against a local quantized model.
//!
//! Callers format a conversation with [`format_prompt`] and hand the result
//! to a [`CompletionBackend`]. Backends keep no conversation state; the
//! caller resubmits the full history on every call.

mod llama;
pub mod prompt;

pub use llama::LlamaServerBackend;
pub use prompt::{format_prompt, ChatMessage, Role, END_OF_TURN};

use std::path::PathBuf;

/// Generation length used by every tool.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Sampling temperature used by every tool.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Context window requested from the runtime.
pub const CONTEXT_SIZE: u32 = 2048;

/// CPU threads requested from the runtime.
pub const THREADS: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Failed to start inference runtime: {0}")]
    Spawn(std::io::Error),
    #[error("Port {port} on 127.0.0.1 is not available for the inference runtime: {source}")]
    PortUnavailable { port: u16, source: std::io::Error },
    #[error("Inference runtime exited during model load ({0})")]
    RuntimeExited(String),
    #[error("Model did not finish loading within {0} seconds")]
    LoadTimeout(u64),
    #[error("Completion request failed: {0}")]
    RequestFailed(String),
    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },
    #[error("Failed to parse completion response: {0}")]
    ParseError(String),
}

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// A request with the defaults every tool uses: 512 tokens,
    /// temperature 0.7, stopping at the next user turn or end-of-turn.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stop: vec!["<|user|>".to_string(), END_OF_TURN.to_string()],
        }
    }

    /// Format `messages` and build a default request from them.
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        Self::new(format_prompt(messages))
    }
}

/// Trait for anything that can turn a formatted prompt into generated text.
///
/// `complete` blocks; async callers run it on a blocking worker.
pub trait CompletionBackend: Send + Sync {
    /// Generate a completion, returning only the new text.
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;

    /// Release whatever the backend holds. Called once when the owning
    /// session ends.
    fn shutdown(&self) {}
}
