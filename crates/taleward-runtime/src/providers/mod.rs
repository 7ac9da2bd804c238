//! LLM provider clients.
//!
//! Every model call in the engine ends up in an [`LlmProvider`]. The
//! Anthropic client talks to the hosted Messages API; the Ollama client talks
//! to a local inference server and also exposes its model list through
//! [`ModelCatalog`], which the router uses to decide whether a bare model
//! name is served locally.
//!
//! Credentials go through [`ApiCredential`] and never show up in logs.

use async_trait::async_trait;
use std::time::Duration;
use taleward_core::Message;
use thiserror::Error;

mod catalog;
mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "ollama")]
mod ollama;

pub use catalog::CachedCatalog;
pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory, ANTHROPIC_API_KEY_ENV};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaProvider, OllamaProviderFactory, DEFAULT_OLLAMA_URL, OLLAMA_URL_ENV};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// HTTP status of the upstream reply, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::ApiError { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// Map a failed `send()` to a provider error; timeouts keep the configured bound.
#[cfg(any(feature = "anthropic", feature = "ollama"))]
pub(crate) fn map_send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(e.to_string())
    }
}

/// Per-call settings. Unset sampling fields use the provider's defaults.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model name as the provider knows it
    pub model: String,

    /// Request timeout
    pub timeout: Duration,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,
}

impl CompletionConfig {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            timeout,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,

    pub usage: TokenUsage,

    /// Model that answered
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one non-streaming chat completion.
    ///
    /// `messages` carries only user and assistant turns; the system prompt
    /// travels separately so each provider can place it where its API wants it.
    async fn complete(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Enumerates the models a backend currently serves.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}
