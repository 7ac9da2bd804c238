//! Adventure document parsing from YAML/JSON.

use crate::config::schema::validate_adventure_schema;
use crate::directive::Difficulty;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Instruction sent to a rewrite model when a step configures none.
pub const DEFAULT_REWRITE_INSTRUCTION: &str =
    "Fix the difficulty of this turn to make it playable.";

/// Question asked of a compare model when a step configures none.
pub const DEFAULT_COMPARE_QUESTION: &str = "Is the revised turn better than the original?";

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when loading an adventure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read adventure file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Adventure does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Adventure validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

fn default_true() -> bool {
    true
}

fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_classifier_timeout() -> u64 {
    DEFAULT_CLASSIFIER_TIMEOUT_SECS
}

/// One judge → rewrite → compare step. Timeouts are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeStepSpec {
    /// Unique identifier within the adventure
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Execution position; ties are broken by `id`
    #[serde(default)]
    pub order: i32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub judge_prompt: String,

    #[serde(default)]
    pub judge_model: String,

    #[serde(default = "default_call_timeout")]
    pub judge_timeout: u64,

    #[serde(default)]
    pub rewrite_instruction: String,

    #[serde(default)]
    pub rewrite_prompt: String,

    #[serde(default)]
    pub rewrite_model: String,

    #[serde(default = "default_call_timeout")]
    pub rewrite_timeout: u64,

    #[serde(default)]
    pub compare_question: String,

    #[serde(default)]
    pub compare_prompt: String,

    #[serde(default)]
    pub compare_model: String,

    #[serde(default = "default_call_timeout")]
    pub compare_timeout: u64,
}

impl JudgeStepSpec {
    /// A step with only an id, a judge model and a judge prompt.
    pub fn new(
        id: impl Into<String>,
        judge_model: impl Into<String>,
        judge_prompt: impl Into<String>,
    ) -> Self {
        let judge_model = judge_model.into();
        Self {
            id: id.into(),
            name: String::new(),
            order: 0,
            enabled: true,
            judge_prompt: judge_prompt.into(),
            judge_model: judge_model.clone(),
            judge_timeout: DEFAULT_CALL_TIMEOUT_SECS,
            rewrite_instruction: String::new(),
            rewrite_prompt: String::new(),
            rewrite_model: judge_model.clone(),
            rewrite_timeout: DEFAULT_CALL_TIMEOUT_SECS,
            compare_question: String::new(),
            compare_prompt: String::new(),
            compare_model: judge_model,
            compare_timeout: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }

    /// Rewrite instruction, or the default one.
    pub fn rewrite_instruction(&self) -> &str {
        if self.rewrite_instruction.trim().is_empty() {
            DEFAULT_REWRITE_INSTRUCTION
        } else {
            &self.rewrite_instruction
        }
    }

    /// Compare question, or the default one.
    pub fn compare_question(&self) -> &str {
        if self.compare_question.trim().is_empty() {
            DEFAULT_COMPARE_QUESTION
        } else {
            &self.compare_question
        }
    }

    /// Display label: the name if set, the id otherwise.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn inherit(&mut self, judge_model: &str, judge_prompt: &str) {
        if self.judge_model.is_empty() {
            self.judge_model = judge_model.to_string();
        }
        if self.judge_prompt.is_empty() {
            self.judge_prompt = judge_prompt.to_string();
        }
        if self.rewrite_model.is_empty() {
            self.rewrite_model = self.judge_model.clone();
        }
        if self.compare_model.is_empty() {
            self.compare_model = self.judge_model.clone();
        }
    }
}

/// Refusal detection and correction settings. Timeouts are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefusalConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub classifier_model: String,

    #[serde(default)]
    pub classifier_prompt: String,

    #[serde(default = "default_classifier_timeout")]
    pub classifier_timeout: u64,

    /// Model that regenerates a refused turn; empty uses the storyteller
    #[serde(default)]
    pub correction_model: String,

    #[serde(default)]
    pub correction_prompt: String,

    #[serde(default = "default_call_timeout")]
    pub correction_timeout: u64,
}

impl Default for RefusalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            classifier_model: String::new(),
            classifier_prompt: String::new(),
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            correction_model: String::new(),
            correction_prompt: String::new(),
            correction_timeout: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl RefusalConfig {
    /// Whether detection should run at all.
    pub fn is_active(&self) -> bool {
        self.enabled
            && !self.classifier_model.trim().is_empty()
            && !self.classifier_prompt.trim().is_empty()
    }
}

/// The active adventure: storyteller, judges and refusal handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdventureConfig {
    /// Human-readable name, also recorded as the audit `prompt_used`
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Storyteller system prompt
    pub adventure_prompt: String,

    pub storyteller_model: String,

    /// Default judge model for steps that leave theirs empty
    #[serde(default)]
    pub judge_model: String,

    /// Default judge prompt for steps that leave theirs empty
    #[serde(default)]
    pub judge_prompt: String,

    #[serde(default)]
    pub judge_steps: Vec<JudgeStepSpec>,

    #[serde(default)]
    pub refusal: RefusalConfig,

    #[serde(default)]
    pub difficulty: Difficulty,
}

impl AdventureConfig {
    /// A bare adventure with no judge steps and refusal handling off.
    pub fn new(
        name: impl Into<String>,
        adventure_prompt: impl Into<String>,
        storyteller_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            adventure_prompt: adventure_prompt.into(),
            storyteller_model: storyteller_model.into(),
            judge_model: String::new(),
            judge_prompt: String::new(),
            judge_steps: Vec::new(),
            refusal: RefusalConfig::default(),
            difficulty: Difficulty::Normal,
        }
    }

    /// Parse an adventure from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(raw)
    }

    /// Parse an adventure from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    /// Parse an adventure from a file, choosing JSON for `.json` and YAML otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    fn from_value(raw: serde_json::Value) -> Result<Self, ConfigError> {
        validate_adventure_schema(&raw).map_err(ConfigError::SchemaError)?;
        let mut config: AdventureConfig = serde_json::from_value(raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Fill inherited step and refusal fields.
    ///
    /// Idempotent; called by every parser and safe to call again after
    /// building a config by hand.
    pub fn normalize(&mut self) {
        let judge_model = self.judge_model.clone();
        let judge_prompt = self.judge_prompt.clone();
        for step in &mut self.judge_steps {
            step.inherit(&judge_model, &judge_prompt);
        }

        if self.refusal.correction_model.is_empty() {
            self.refusal.correction_model = self.storyteller_model.clone();
        }
    }

    /// Validate the adventure structure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }

        if self.adventure_prompt.trim().is_empty() {
            return Err(ConfigError::MissingField("adventure_prompt".to_string()));
        }

        if self.storyteller_model.trim().is_empty() {
            return Err(ConfigError::MissingField("storyteller_model".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &self.judge_steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate judge step ID: {}",
                    step.id
                )));
            }

            if step.enabled && step.judge_model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Judge step {} has no judge model and no adventure-level default",
                    step.id
                )));
            }
        }

        Ok(())
    }

    /// Enabled steps in execution order: by `order`, then by `id`.
    pub fn enabled_steps(&self) -> Vec<&JudgeStepSpec> {
        enabled_in_order(&self.judge_steps)
    }
}

/// Enabled steps sorted by `order`, then by `id`.
pub fn enabled_in_order(steps: &[JudgeStepSpec]) -> Vec<&JudgeStepSpec> {
    let mut enabled: Vec<&JudgeStepSpec> = steps.iter().filter(|s| s.enabled).collect();
    enabled.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    enabled
}
