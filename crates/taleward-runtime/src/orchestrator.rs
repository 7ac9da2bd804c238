//! Turn orchestrator.
//!
//! One request, one mode, chosen by the requested model name:
//!
//! - **test**: canned turn, no model calls
//! - **base**: storyteller (plus refusal correction), stored for the
//!   moderated twin of the same request
//! - **moderated**: waits for the stored base turn and judges it
//! - **production**: storyteller, refusal correction and judges in one call
//!
//! Base and moderated requests never talk to each other directly; they meet
//! in the shared [`RendezvousStore`] under the key of the conversation state.
//! A moderated request takes the base entry, so each base turn is judged once.

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::config::RuntimeConfig;
use crate::invoker::{InvokeError, LlmInvoker};
use crate::judge::JudgePipeline;
use crate::prompts::TEST_MODE_RESPONSE;
use crate::refusal::RefusalCorrector;
use crate::rendezvous::{
    RendezvousStore, DEFAULT_POLL_INTERVAL, DEFAULT_TTL, DEFAULT_WAIT_TIMEOUT,
};
use crate::router::RouteError;
use crate::EngineError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use taleward_core::{
    apply_directive, extract_game_state, rendezvous_key, split_system, AdventureConfig,
    AppliedDirective, GameState, Message, PipelineResult, RefusalResult,
};

const DEFAULT_STORYTELLER_TIMEOUT: Duration = Duration::from_secs(120);

/// Which flow produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Test,
    Base,
    Moderated,
    Production,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Test => "test",
            Speaker::Base => "base",
            Speaker::Moderated => "moderated",
            Speaker::Production => "production",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model names that select each mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeTable {
    pub test: String,
    pub base: String,
    pub moderated: String,
    pub production: String,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            test: "cyoa-test".to_string(),
            base: "cyoa-base".to_string(),
            moderated: "cyoa-moderated".to_string(),
            production: "cyoa-dual".to_string(),
        }
    }
}

impl ModeTable {
    /// Every accepted model name.
    pub fn identifiers(&self) -> Vec<&str> {
        vec![
            self.test.as_str(),
            self.base.as_str(),
            self.moderated.as_str(),
            self.production.as_str(),
        ]
    }

    /// Mode for a requested model name. A `provider/` prefix is ignored.
    pub fn resolve(&self, model: &str) -> Option<Speaker> {
        let name = model.trim().rsplit('/').next().unwrap_or_default();
        [
            (&self.test, Speaker::Test),
            (&self.base, Speaker::Base),
            (&self.moderated, Speaker::Moderated),
            (&self.production, Speaker::Production),
        ]
        .into_iter()
        .find(|(id, _)| id.as_str() == name)
        .map(|(_, speaker)| speaker)
    }
}

/// An inbound turn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub model: String,
    pub messages: Vec<Message>,

    /// Seeds the difficulty roll; the conversation's first message is used
    /// when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            conversation_id: None,
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// The turn handed back to the player, with how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub speaker: Speaker,
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<RefusalResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<AppliedDirective>,

    pub game_state: GameState,
}

impl TurnResponse {
    fn new(speaker: Speaker, content: String) -> Self {
        let game_state = extract_game_state(&content);
        Self {
            speaker,
            content,
            pipeline: None,
            refusal: None,
            directive: None,
            game_state,
        }
    }

    /// Wrap the turn in an OpenAI-style `chat.completion` body.
    pub fn into_completion(self, model: &str) -> ChatCompletion {
        let created = Utc::now();
        ChatCompletion {
            id: format!(
                "chatcmpl-{}-{}",
                self.speaker,
                created.timestamp_nanos_opt().unwrap_or_default()
            ),
            object: "chat.completion".to_string(),
            created: created.timestamp(),
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: Message::assistant(self.content),
                finish_reason: "stop".to_string(),
            }],
            usage: CompletionUsage::default(),
        }
    }
}

/// OpenAI-compatible completion envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: CompletionUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// Token counts are not tracked across the engine; always zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Runs requests in every mode against one adventure.
pub struct TurnOrchestrator {
    invoker: Arc<dyn LlmInvoker>,
    adventure: AdventureConfig,
    modes: ModeTable,
    store: Arc<RendezvousStore<BaseTurn>>,
    wait_timeout: Duration,
    poll_interval: Duration,
    storyteller_timeout: Duration,
    judge: JudgePipeline,
    refusal: RefusalCorrector,
    audit: Arc<dyn AuditSink>,
}

impl TurnOrchestrator {
    pub fn builder(invoker: Arc<dyn LlmInvoker>, adventure: AdventureConfig) -> TurnOrchestratorBuilder {
        TurnOrchestratorBuilder::new(invoker, adventure)
    }

    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    pub fn adventure(&self) -> &AdventureConfig {
        &self.adventure
    }

    pub fn store(&self) -> &Arc<RendezvousStore<BaseTurn>> {
        &self.store
    }

    /// Handle one request in the mode its model name selects.
    pub async fn handle(&self, request: TurnRequest) -> Result<TurnResponse, EngineError> {
        let speaker = self.modes.resolve(&request.model).ok_or_else(|| {
            EngineError::UnknownModel {
                requested: request.model.clone(),
                valid: self.modes.identifiers().into_iter().map(String::from).collect(),
            }
        })?;

        tracing::info!(speaker = %speaker, messages = request.messages.len(), "turn request");

        match speaker {
            Speaker::Test => Ok(TurnResponse::new(Speaker::Test, TEST_MODE_RESPONSE.to_string())),
            Speaker::Base => self.base_turn(&request).await,
            Speaker::Moderated => self.moderated_turn(&request).await,
            Speaker::Production => self.production_turn(&request).await,
        }
    }

    async fn base_turn(&self, request: &TurnRequest) -> Result<TurnResponse, EngineError> {
        let (system, history) = split_system(&request.messages);
        let key = rendezvous_key(&history);

        let story = self.tell(request, system, &history, &key).await?;
        self.store.put(
            &key,
            BaseTurn {
                turn: story.turn.clone(),
                original: story.raw,
                was_refusal: story.refusal.was_refusal,
            },
        );
        tracing::info!(key = %key, "base turn stored");

        let mut response = TurnResponse::new(Speaker::Base, story.turn);
        response.refusal = Some(story.refusal);
        response.directive = story.directive;
        Ok(response)
    }

    async fn moderated_turn(&self, request: &TurnRequest) -> Result<TurnResponse, EngineError> {
        let (_, history) = split_system(&request.messages);
        let key = rendezvous_key(&history);

        let base = self
            .store
            .wait_for_take(&key, self.wait_timeout, self.poll_interval)
            .await?;
        tracing::info!(key = %key, was_refusal = base.was_refusal, "base turn taken");

        let pipeline = self
            .judge
            .run(&base.turn, &history, &self.adventure.judge_steps)
            .await;
        self.audit.record(AuditRecord::new(
            base.original,
            pipeline.final_turn.as_str(),
            pipeline.was_modified,
            base.was_refusal,
            self.adventure.name.as_str(),
        ));

        let mut response = TurnResponse::new(Speaker::Moderated, pipeline.final_turn.clone());
        response.pipeline = Some(pipeline);
        Ok(response)
    }

    async fn production_turn(&self, request: &TurnRequest) -> Result<TurnResponse, EngineError> {
        let (system, history) = split_system(&request.messages);
        let key = rendezvous_key(&history);

        let story = self.tell(request, system, &history, &key).await?;
        let pipeline = self
            .judge
            .run(&story.turn, &story.input, &self.adventure.judge_steps)
            .await;

        if pipeline.final_turn.trim().is_empty() {
            return Err(EngineError::EmptyTurn("judge pipeline".to_string()));
        }

        self.audit.record(AuditRecord::new(
            story.raw.as_str(),
            pipeline.final_turn.as_str(),
            pipeline.was_modified,
            story.refusal.was_refusal,
            self.adventure.name.as_str(),
        ));

        let mut response = TurnResponse::new(Speaker::Production, pipeline.final_turn.clone());
        response.pipeline = Some(pipeline);
        response.refusal = Some(story.refusal);
        response.directive = story.directive;
        Ok(response)
    }

    /// Call the storyteller and run refusal correction over its reply.
    async fn tell(
        &self,
        request: &TurnRequest,
        system: Option<String>,
        history: &[Message],
        key: &str,
    ) -> Result<Story, EngineError> {
        let system = system.unwrap_or_else(|| self.adventure.adventure_prompt.clone());
        let model = self.adventure.storyteller_model.as_str();

        let mut input = history.to_vec();
        let chat_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| key.split('-').next().unwrap_or(key).to_string());
        let directive = apply_directive(&mut input, &self.adventure.difficulty, &chat_id);
        if let Some(applied) = &directive {
            tracing::info!(kind = ?applied.kind, choice = applied.choice_index, "difficulty directive applied");
        }

        let raw = self
            .invoker
            .invoke(&input, Some(system.as_str()), model, self.storyteller_timeout)
            .await
            .map_err(|e| storyteller_error(model, e))?;

        if raw.trim().is_empty() {
            return Err(EngineError::EmptyTurn(format!("storyteller '{}'", model)));
        }

        let mut with_turn = input.clone();
        with_turn.push(Message::assistant(raw.as_str()));
        let refusal = self
            .refusal
            .detect_and_correct(&raw, &with_turn, &self.adventure.refusal, &system)
            .await;

        Ok(Story {
            turn: refusal.final_turn.clone(),
            raw,
            input,
            refusal,
            directive,
        })
    }
}

impl fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnOrchestrator")
            .field("adventure", &self.adventure.name)
            .field("modes", &self.modes)
            .field("wait_timeout", &self.wait_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// A base turn waiting for its moderated twin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTurn {
    /// Text handed to the judges, after refusal correction
    pub turn: String,

    /// Storyteller reply before refusal correction
    pub original: String,

    pub was_refusal: bool,
}

/// Storyteller output after refusal handling.
struct Story {
    turn: String,

    /// Storyteller reply as received
    raw: String,

    /// Messages the storyteller saw, directive included
    input: Vec<Message>,

    refusal: RefusalResult,
    directive: Option<AppliedDirective>,
}

fn storyteller_error(model: &str, error: InvokeError) -> EngineError {
    match error {
        InvokeError::Route(RouteError::UnroutableModel(m)) => EngineError::UnroutableModel(m),
        other => {
            tracing::warn!(model, error = %other, "storyteller call failed");
            EngineError::UpstreamCallFailure {
                model: model.to_string(),
                source: other,
            }
        }
    }
}

/// Builder for [`TurnOrchestrator`].
pub struct TurnOrchestratorBuilder {
    invoker: Arc<dyn LlmInvoker>,
    adventure: AdventureConfig,
    modes: ModeTable,
    store: Option<Arc<RendezvousStore<BaseTurn>>>,
    ttl: Duration,
    wait_timeout: Duration,
    poll_interval: Duration,
    storyteller_timeout: Duration,
    audit: Arc<dyn AuditSink>,
}

impl TurnOrchestratorBuilder {
    fn new(invoker: Arc<dyn LlmInvoker>, adventure: AdventureConfig) -> Self {
        Self {
            invoker,
            adventure,
            modes: ModeTable::default(),
            store: None,
            ttl: DEFAULT_TTL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            storyteller_timeout: DEFAULT_STORYTELLER_TIMEOUT,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Take modes and timings from a runtime document.
    pub fn runtime_config(mut self, config: &RuntimeConfig) -> Self {
        self.modes = config.modes.clone();
        self.ttl = config.rendezvous.ttl;
        self.wait_timeout = config.rendezvous.wait_timeout;
        self.poll_interval = config.rendezvous.poll_interval;
        self.storyteller_timeout = config.storyteller_timeout;
        self
    }

    pub fn modes(mut self, modes: ModeTable) -> Self {
        self.modes = modes;
        self
    }

    /// Share an existing store; otherwise one is created with the configured TTL.
    pub fn store(mut self, store: Arc<RendezvousStore<BaseTurn>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn storyteller_timeout(mut self, timeout: Duration) -> Self {
        self.storyteller_timeout = timeout;
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn build(self) -> TurnOrchestrator {
        let mut adventure = self.adventure;
        adventure.normalize();

        TurnOrchestrator {
            judge: JudgePipeline::new(Arc::clone(&self.invoker)),
            refusal: RefusalCorrector::new(Arc::clone(&self.invoker)),
            invoker: self.invoker,
            adventure,
            modes: self.modes,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(RendezvousStore::new(self.ttl))),
            wait_timeout: self.wait_timeout,
            poll_interval: self.poll_interval,
            storyteller_timeout: self.storyteller_timeout,
            audit: self.audit,
        }
    }
}
