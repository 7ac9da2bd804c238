//! Scripted invoker for deterministic tests.
//!
//! [`ScriptedInvoker`] answers each model from its own FIFO queue of canned
//! replies and records every call, so tests can drive the judge pipeline,
//! the refusal corrector and the orchestrator without a network.

use crate::invoker::{InvokeError, LlmInvoker};
use crate::providers::ProviderError;
use crate::router::Provider;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use taleward_core::Message;
use tokio::sync::Mutex;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub timeout: Duration,
}

enum Scripted {
    Reply(String),
    Fail(String),
}

/// An [`LlmInvoker`] that replays canned replies per model id.
///
/// A model with an empty queue fails with a 500-style provider error.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for `model`.
    pub fn reply(self, model: &str, text: impl Into<String>) -> Self {
        self.push(model, Scripted::Reply(text.into()))
    }

    /// Queue a failing call for `model`.
    pub fn fail(self, model: &str, message: impl Into<String>) -> Self {
        self.push(model, Scripted::Fail(message.into()))
    }

    fn push(mut self, model: &str, item: Scripted) -> Self {
        self.scripts
            .get_mut()
            .entry(model.to_string())
            .or_default()
            .push_back(item);
        self
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Calls made to one model.
    pub async fn calls_to(&self, model: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.model == model)
            .cloned()
            .collect()
    }

    /// Replies queued but never consumed.
    pub async fn remaining(&self) -> usize {
        self.scripts.lock().await.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl LlmInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<String, InvokeError> {
        self.calls.lock().await.push(RecordedCall {
            model: model.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            messages: messages.to_vec(),
            timeout,
        });

        let next = self
            .scripts
            .lock()
            .await
            .get_mut(model)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(InvokeError::Provider {
                provider: Provider::Ollama,
                source: ProviderError::HttpError(message),
            }),
            None => Err(InvokeError::Provider {
                provider: Provider::Ollama,
                source: ProviderError::ApiError {
                    status: 500,
                    message: format!("no scripted reply for {}", model),
                },
            }),
        }
    }
}
