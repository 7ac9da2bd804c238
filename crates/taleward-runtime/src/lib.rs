//! # taleward-runtime
//!
//! Async engine that moderates storyteller turns.
//!
//! A turn request names a mode through its model name. The orchestrator
//! calls the storyteller, corrects refusals, hands base turns to their
//! moderated twins through the rendezvous store, and runs the judge
//! pipeline. Model calls go through [`LlmInvoker`], which routes each model
//! id to the Anthropic or Ollama client.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taleward_core::{AdventureConfig, Message};
//! use taleward_runtime::{RuntimeConfig, TurnOrchestrator, TurnRequest};
//!
//! let runtime = RuntimeConfig::from_file("runtime.yaml")?;
//! let adventure = AdventureConfig::from_file("adventure.yaml")?;
//! let invoker = Arc::new(runtime.build_invoker()?);
//!
//! let engine = TurnOrchestrator::builder(invoker, adventure)
//!     .runtime_config(&runtime)
//!     .build();
//!
//! let turn = engine
//!     .handle(TurnRequest::new("cyoa-dual", vec![Message::user("Start")]))
//!     .await?;
//! println!("{}", turn.content);
//! ```

use std::time::Duration;
use thiserror::Error;

pub mod audit;
pub mod config;
pub mod invoker;
pub mod judge;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod refusal;
pub mod rendezvous;
pub mod router;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{RendezvousSettings, RuntimeConfig, RuntimeConfigError};
pub use invoker::{InvokeError, LlmInvoker, RoutedInvoker};
pub use judge::JudgePipeline;
pub use orchestrator::{
    BaseTurn, ChatCompletion, ModeTable, Speaker, TurnOrchestrator, TurnOrchestratorBuilder, TurnRequest,
    TurnResponse,
};
pub use providers::{LlmProvider, ModelCatalog, ProviderError};
pub use refusal::RefusalCorrector;
pub use rendezvous::{Clock, ManualClock, RendezvousError, RendezvousStore, SystemClock};
pub use router::{ModelRouter, Provider, Route, RouteError, RouteRule, RouterRules};

/// Errors surfaced to the caller of a turn request.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown model '{requested}'. Valid models: {}", .valid.join(", "))]
    UnknownModel {
        requested: String,
        valid: Vec<String>,
    },

    #[error("No provider rule matches model '{0}'")]
    UnroutableModel(String),

    #[error("Storyteller call to '{model}' failed: {source}")]
    UpstreamCallFailure {
        model: String,
        #[source]
        source: InvokeError,
    },

    #[error("{0} produced an empty turn")]
    EmptyTurn(String),

    #[error("No base turn for '{key}' after {waited:?}; send the base request first")]
    CacheTimeout { key: String, waited: Duration },

    #[error("Refusal correction failed: {0}")]
    RefusalCorrectionFailure(String),

    #[error(transparent)]
    Config(#[from] RuntimeConfigError),
}

impl EngineError {
    /// HTTP status class for an outer server.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::UnknownModel { .. } | EngineError::UnroutableModel(_) => 400,
            EngineError::CacheTimeout { .. } => 408,
            EngineError::UpstreamCallFailure { .. } => 502,
            EngineError::EmptyTurn(_)
            | EngineError::RefusalCorrectionFailure(_)
            | EngineError::Config(_) => 500,
        }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::CacheTimeout { .. } | EngineError::UpstreamCallFailure { .. }
        )
    }
}

impl From<RendezvousError> for EngineError {
    fn from(err: RendezvousError) -> Self {
        match err {
            RendezvousError::Timeout { key, waited } => EngineError::CacheTimeout { key, waited },
        }
    }
}

impl From<RouteError> for EngineError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::UnroutableModel(model) => EngineError::UnroutableModel(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let timeout = EngineError::from(RendezvousError::Timeout {
            key: "abcd1234-4".into(),
            waited: Duration::from_secs(30),
        });
        assert_eq!(timeout.status_code(), 408);
        assert!(timeout.is_retryable());

        let unroutable = EngineError::from(RouteError::UnroutableModel("mystery".into()));
        assert_eq!(unroutable.status_code(), 400);
        assert!(!unroutable.is_retryable());
        assert!(unroutable.to_string().contains("mystery"));
    }

    #[test]
    fn test_unknown_model_message_lists_valid_names() {
        let err = EngineError::UnknownModel {
            requested: "gpt-4".into(),
            valid: vec!["cyoa-test".into(), "cyoa-base".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown model 'gpt-4'. Valid models: cyoa-test, cyoa-base"
        );
    }
}
