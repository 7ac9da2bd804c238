//! Adventure configuration.
//!
//! An adventure names the storyteller, the ordered judge steps and the
//! refusal settings the engine runs with. Documents are YAML or JSON and are
//! checked against an embedded JSON Schema before they are deserialized.

mod parser;
mod schema;

pub use parser::{
    enabled_in_order, AdventureConfig, ConfigError, JudgeStepSpec, RefusalConfig,
    DEFAULT_COMPARE_QUESTION, DEFAULT_REWRITE_INSTRUCTION,
};
pub use schema::validate_adventure_schema;
