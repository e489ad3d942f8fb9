//! Ollama provider over the OpenAI-compatible `/chat/completions` endpoint.
//!
//! Local models served by Ollama speak the OpenAI chat API. Tool use is not
//! negotiated through the API; the model is instructed via the system prompt
//! and the raw completion text is returned as-is.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, CompletionRequest, LlmProvider, ProviderError};

const RETRY_BACKOFF_MS: &[u64] = &[500, 2_000, 5_000];

fn retry_backoff_ms(attempt: u32) -> u64 {
    let idx = (attempt as usize).min(RETRY_BACKOFF_MS.len() - 1);
    RETRY_BACKOFF_MS[idx]
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
            max_retries: 2,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn try_complete(&self, payload: &ApiRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let resp = match self.client.post(url).json(payload).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ProviderError::Timeout(self.timeout_secs));
            }
            Err(e) => return Err(ProviderError::Transport(e.to_string())),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let message = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited(message),
                code => ProviderError::Http {
                    status: code,
                    message,
                },
            });
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("invalid response body: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let payload = ApiRequest::from(request);

        let mut attempt = 0u32;
        loop {
            match self.try_complete(&payload).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = retry_backoff_ms(attempt);
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff,
                        error = %err,
                        "retrying model completion"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl From<CompletionRequest> for ApiRequest {
    fn from(request: CompletionRequest) -> Self {
        Self {
            model: request.model,
            messages: request.messages,
            max_tokens: Some(request.max_tokens),
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub choices: Vec<ApiChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiAssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiAssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}
