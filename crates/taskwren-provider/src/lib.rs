//! Model-completion collaborator.
//!
//! The dispatch loop treats the model as a single blocking call:
//! `complete(request) -> text`. There is no native tool-call field; the tool
//! catalog travels inside the system prompt and structured calls are parsed
//! out of the completion text by the core. The provider may retry transient
//! transport failures internally; a request timeout is never retried and is
//! fatal for the calling turn.

pub mod ollama;

pub use ollama::OllamaProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("model request timed out after {0}s")]
    Timeout(u64),
    #[error("model endpoint rate limited: {0}")]
    RateLimited(String),
    #[error("model http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

impl ProviderError {
    /// Whether the provider's own bounded retry loop may attempt again.
    /// Timeouts are deliberately excluded: the turn treats them as fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) | ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}
