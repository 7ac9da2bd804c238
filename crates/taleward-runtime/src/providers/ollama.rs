//! Ollama client for local inference servers.

use super::{
    factory::ProviderFactory, map_send_error, CompletionConfig, CompletionResponse, LlmProvider, ModelCatalog,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use taleward_core::Message;

/// Environment variable overriding the Ollama server URL.
pub const OLLAMA_URL_ENV: &str = "OLLAMA_URL";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Ollama provider, also the catalog behind the router's live-model rule.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Server URL from `OLLAMA_URL`, or the localhost default.
    pub fn from_env() -> Self {
        let url = std::env::var(OLLAMA_URL_ENV).unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::new(url)
    }

    /// Build from JSON settings: optional `base_url`, else the environment.
    pub fn from_config(config: &JsonValue) -> Self {
        match config["base_url"].as_str() {
            Some(url) => Self::new(url),
            None => Self::from_env(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Models currently loaded in memory (`GET /api/ps`).
    pub async fn loaded_models(&self) -> Result<Vec<String>, ProviderError> {
        self.model_names("/api/ps", STATUS_TIMEOUT).await
    }

    async fn model_names(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(list.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut chat = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            chat.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        chat.extend(messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let request = ChatRequest {
            model: &config.model,
            messages: chat,
            stream: false,
            options: ChatOptions {
                temperature: config.temperature.unwrap_or(0.7),
                top_p: 0.9,
                top_k: 40,
                repeat_penalty: 1.1,
                num_predict: config.max_tokens,
            },
        };

        tracing::debug!(base_url = %self.base_url, model = %config.model, "ollama chat");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if body.message.content.is_empty()
            && body.message.thinking.as_deref().is_some_and(|t| !t.is_empty())
        {
            tracing::warn!(
                model = %config.model,
                "ollama returned only thinking output, treating reply as empty"
            );
        }

        Ok(CompletionResponse {
            content: body.message.content,
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
            },
            model: body.model,
            stop_reason: body.done_reason,
        })
    }

    async fn health_check(&self) -> bool {
        self.model_names("/api/tags", STATUS_TIMEOUT).await.is_ok()
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl ModelCatalog for OllamaProvider {
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.model_names("/api/tags", CATALOG_TIMEOUT).await
    }
}

/// Factory for Ollama providers.
///
/// ```json
/// { "base_url": "http://localhost:11434" }
/// ```
pub struct OllamaProviderFactory;

impl ProviderFactory for OllamaProviderFactory {
    fn provider_type(&self) -> &'static str {
        "ollama"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(OllamaProvider::from_config(config)))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Ollama local inference server"
    }
}
