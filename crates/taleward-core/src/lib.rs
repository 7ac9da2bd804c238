//! # taleward-core
//!
//! Deterministic building blocks for moderating an LLM-told adventure.
//!
//! Nothing in this crate performs I/O beyond reading a config file. The async
//! engine in `taleward-runtime` drives models; this crate decides what their
//! replies mean and what to send them:
//!
//! - [`parse_verdict`]: lenient yes/no reading of judge and compare replies
//! - [`is_refusal_reply`]: refusal-classifier reply check
//! - [`rendezvous_key`]: the key a base turn and its moderated twin share
//! - [`strip_trailing_assistant`]: corrective context for a refused turn
//! - [`AdventureConfig`]: storyteller, judge steps and refusal settings
//! - [`extract_game_state`] and [`apply_directive`]: game-side helpers
//!
//! ## Example
//!
//! ```rust,ignore
//! use taleward_core::{AdventureConfig, parse_verdict, rendezvous_key, Message};
//!
//! let adventure = AdventureConfig::from_file("adventure.yaml")?;
//! let history = vec![Message::user("Start"), Message::assistant("Turn 1 of 10 ...")];
//! let key = rendezvous_key(&history);
//! assert!(parse_verdict("YES, playable", false));
//! ```

pub mod config;
pub mod directive;
pub mod game_state;
pub mod key;
pub mod patterns;
pub mod trace;
pub mod types;
pub mod verdict;

pub use config::{
    enabled_in_order, AdventureConfig, ConfigError, JudgeStepSpec, RefusalConfig,
    DEFAULT_COMPARE_QUESTION, DEFAULT_REWRITE_INSTRUCTION,
};
pub use directive::{apply_directive, AppliedDirective, Difficulty, DirectiveKind, HardCurve};
pub use game_state::{extract_game_state, GameState};
pub use key::rendezvous_key;
pub use patterns::is_refusal_reply;
pub use trace::{FinalUsed, PipelineResult, RefusalResult, StepTrace};
pub use types::{split_system, strip_trailing_assistant, Message, Role};
pub use verdict::{parse_verdict, COMPARE_DEFAULT, JUDGE_DEFAULT};
