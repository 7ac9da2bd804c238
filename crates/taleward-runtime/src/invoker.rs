//! The single entry point for model calls.
//!
//! Judge steps, the refusal corrector and the orchestrator all call models
//! through [`LlmInvoker`]. [`RoutedInvoker`] is the production implementation:
//! it routes the model id, picks the provider instance for the routed backend
//! and bounds the whole call with the per-call timeout.

use crate::providers::{CompletionConfig, LlmProvider, ProviderError};
use crate::router::{ModelRouter, Provider, RouteError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taleward_core::Message;
use thiserror::Error;

/// Errors from a single model invocation.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("No {0} provider is configured")]
    ProviderUnavailable(Provider),

    #[error("{provider} call failed: {source}")]
    Provider {
        provider: Provider,
        #[source]
        source: ProviderError,
    },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
}

impl InvokeError {
    /// HTTP status of the upstream reply, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            InvokeError::Provider { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Runs one chat completion against a backend model id.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    /// Call `model` with `messages` and an optional system prompt.
    ///
    /// `messages` must not contain system-role entries; the system prompt is
    /// passed separately.
    async fn invoke(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<String, InvokeError>;
}

/// Invoker backed by the model router and one provider per backend.
#[derive(Default)]
pub struct RoutedInvoker {
    router: ModelRouter,
    providers: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl RoutedInvoker {
    pub fn new(router: ModelRouter) -> Self {
        Self {
            router,
            providers: HashMap::new(),
        }
    }

    /// Serve `provider` routes with `client`.
    pub fn with_provider(mut self, provider: Provider, client: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider, client);
        self
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn has_provider(&self, provider: Provider) -> bool {
        self.providers.contains_key(&provider)
    }
}

impl std::fmt::Debug for RoutedInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.providers.keys().map(|p| p.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("RoutedInvoker")
            .field("router", &self.router)
            .field("providers", &providers)
            .finish()
    }
}

#[async_trait]
impl LlmInvoker for RoutedInvoker {
    async fn invoke(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<String, InvokeError> {
        let route = self.router.route(model).await?;
        let client = self
            .providers
            .get(&route.provider)
            .ok_or(InvokeError::ProviderUnavailable(route.provider))?;

        tracing::debug!(
            provider = %route.provider,
            model = %route.model,
            rule = ?route.rule,
            messages = messages.len(),
            "invoking model"
        );

        let config = CompletionConfig::new(route.model.as_str(), timeout);
        let call = client.complete(messages, system_prompt, &config);

        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| InvokeError::Timeout(timeout))?
            .map_err(|source| InvokeError::Provider {
                provider: route.provider,
                source,
            })?;

        tracing::debug!(
            provider = %route.provider,
            model = %route.model,
            tokens = response.usage.total(),
            "model replied"
        );

        Ok(response.content)
    }
}
