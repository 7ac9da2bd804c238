//! Refusal detection and correction.
//!
//! A small classifier model decides whether the storyteller declined to
//! write a turn. When it did, the refused reply is stripped from the
//! conversation and a correction model writes a replacement. Both calls fail
//! safe: a classifier error lets the turn through, a correction error keeps
//! the refused text.

use crate::invoker::LlmInvoker;
use crate::prompts::classifier_payload;
use std::sync::Arc;
use std::time::Duration;
use taleward_core::{
    is_refusal_reply, strip_trailing_assistant, Message, RefusalConfig, RefusalResult,
};

/// Classifies a storyteller turn and replaces it if it was a refusal.
#[derive(Clone)]
pub struct RefusalCorrector {
    invoker: Arc<dyn LlmInvoker>,
}

impl RefusalCorrector {
    pub fn new(invoker: Arc<dyn LlmInvoker>) -> Self {
        Self { invoker }
    }

    /// Check `turn` and correct it when the classifier flags a refusal.
    ///
    /// `history` is the conversation with `turn` as its last assistant
    /// message. `fallback_system` is used as the correction system prompt
    /// when the adventure does not configure one.
    pub async fn detect_and_correct(
        &self,
        turn: &str,
        history: &[Message],
        config: &RefusalConfig,
        fallback_system: &str,
    ) -> RefusalResult {
        if !config.is_active() {
            tracing::debug!("refusal detection inactive");
            return RefusalResult::passthrough(turn, "");
        }

        let (was_refusal, classifier_response) = self.classify(turn, config).await;
        if !was_refusal {
            return RefusalResult::passthrough(turn, classifier_response);
        }

        let context = strip_trailing_assistant(history);
        let mut result = RefusalResult {
            final_turn: turn.to_string(),
            was_refusal: true,
            classifier_response,
            was_corrected: false,
        };

        let system = if config.correction_prompt.trim().is_empty() {
            fallback_system
        } else {
            config.correction_prompt.as_str()
        };

        match self
            .invoker
            .invoke(
                &context,
                Some(system).filter(|s| !s.trim().is_empty()),
                &config.correction_model,
                Duration::from_secs(config.correction_timeout),
            )
            .await
        {
            Ok(corrected) if !corrected.trim().is_empty() => {
                tracing::info!(
                    model = %config.correction_model,
                    chars = corrected.len(),
                    "refusal corrected"
                );
                result.final_turn = corrected;
                result.was_corrected = true;
            }
            Ok(_) => {
                tracing::warn!(model = %config.correction_model, "correction was empty, keeping refused turn");
            }
            Err(e) => {
                tracing::warn!(
                    model = %config.correction_model,
                    error = %e,
                    "correction failed, keeping refused turn"
                );
            }
        }

        result
    }

    /// Returns whether the classifier flagged a refusal, and its raw reply.
    async fn classify(&self, turn: &str, config: &RefusalConfig) -> (bool, String) {
        let reply = self
            .invoker
            .invoke(
                &[Message::user(classifier_payload(turn))],
                Some(config.classifier_prompt.as_str()),
                &config.classifier_model,
                Duration::from_secs(config.classifier_timeout),
            )
            .await;

        match reply {
            Ok(reply) => {
                let refused = is_refusal_reply(&reply);
                if refused {
                    tracing::warn!(model = %config.classifier_model, "storyteller refusal detected");
                } else {
                    tracing::debug!(model = %config.classifier_model, "turn classified as valid");
                }
                (refused, reply)
            }
            Err(e) => {
                tracing::warn!(model = %config.classifier_model, error = %e, "classifier failed, letting turn through");
                (false, format!("Error: {}", e))
            }
        }
    }
}
