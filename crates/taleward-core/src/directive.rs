//! Difficulty directives.
//!
//! Harder adventures append a `<GAME_DIRECTIVE>` to the player's latest choice
//! before the storyteller sees it. Hard mode rolls for death with a
//! probability that grows with the number of choices made; extreme mode ends
//! the game on the very first choice. Rolls are derived from the chat id and
//! the choice text, so replaying a request gives the same outcome.

use crate::patterns::contains_directive;
use crate::types::{Message, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const HARD_DEATH_DIRECTIVE: &str = "<GAME_DIRECTIVE>\
HARD MODE: On this turn, the player character must die or suffer an irreversible failure \
that ends the adventure. End the story fully on THIS turn and do not offer further choices.\
</GAME_DIRECTIVE>";

const HARD_CONTINUE_DIRECTIVE: &str = "<GAME_DIRECTIVE>\
HARD MODE: Continue the adventure into the next turn. Apply realistic and meaningful \
consequences for the player's choice, keep the difficulty high, and present exactly two \
non-trivial options.\
</GAME_DIRECTIVE>";

const EXTREME_DIRECTIVE: &str = "<GAME_DIRECTIVE>\
EXTREME MODE: Regardless of the player's decision, this turn must end in their irreversible \
failure or death. End the story fully on THIS turn and do not offer further choices.\
</GAME_DIRECTIVE>";

/// Death-probability curve for hard mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardCurve {
    /// Early choices with no death chance
    pub grace_choices: u32,

    /// Probability on the first choice after the grace period
    pub min_p: f64,

    /// Probability once the ramp is complete
    pub max_p: f64,

    /// Choices over which the probability ramps from `min_p` to `max_p`
    pub ramp_choices: u32,
}

impl Default for HardCurve {
    fn default() -> Self {
        Self {
            grace_choices: 2,
            min_p: 0.05,
            max_p: 0.40,
            ramp_choices: 10,
        }
    }
}

impl HardCurve {
    /// Death probability for a 1-based choice index.
    pub fn death_probability(&self, choice_idx: u32) -> f64 {
        if choice_idx <= self.grace_choices {
            return 0.0;
        }

        let effective = choice_idx - self.grace_choices;
        if effective >= self.ramp_choices || self.ramp_choices <= 1 {
            return self.max_p;
        }

        let frac = f64::from(effective - 1) / f64::from(self.ramp_choices - 1);
        self.min_p + frac * (self.max_p - self.min_p)
    }
}

/// How hard an adventure is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Normal,
    Hard(HardCurve),
    Extreme,
}

/// Which directive was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    HardDeath,
    HardContinue,
    ExtremeFailure,
}

impl DirectiveKind {
    fn text(&self) -> &'static str {
        match self {
            DirectiveKind::HardDeath => HARD_DEATH_DIRECTIVE,
            DirectiveKind::HardContinue => HARD_CONTINUE_DIRECTIVE,
            DirectiveKind::ExtremeFailure => EXTREME_DIRECTIVE,
        }
    }
}

/// A directive that was appended to the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDirective {
    pub kind: DirectiveKind,
    pub choice_index: u32,
    pub probability: f64,
    pub roll: Option<f64>,
}

/// 1-based index of the message at `idx` as a real choice.
///
/// A real choice is a user message that comes after at least one assistant
/// message. Returns `None` for anything else.
pub fn choice_index(messages: &[Message], idx: usize) -> Option<u32> {
    let target = messages.get(idx)?;
    if target.role != Role::User {
        return None;
    }

    let mut seen_assistant = false;
    let mut prior_choices: u32 = 0;
    for msg in &messages[..idx] {
        match msg.role {
            Role::Assistant => seen_assistant = true,
            Role::User if seen_assistant => prior_choices += 1,
            _ => {}
        }
    }

    seen_assistant.then_some(prior_choices + 1)
}

/// Pseudo-random value in `[0, 1)` derived from its inputs.
pub fn deterministic_roll(chat_id: &str, choice_idx: u32, user_text: &str) -> f64 {
    let seed = format!("{}|{}|{}", chat_id, choice_idx, user_text);
    let digest = Sha256::digest(seed.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    f64::from(head) / 4_294_967_296.0
}

/// Append the difficulty directive to the last user message, if one applies.
///
/// Leaves the messages untouched for normal difficulty, when the last user
/// message is not a real choice, or when it already carries a directive.
pub fn apply_directive(
    messages: &mut [Message],
    difficulty: &Difficulty,
    chat_id: &str,
) -> Option<AppliedDirective> {
    if *difficulty == Difficulty::Normal {
        return None;
    }

    let last_user = messages.iter().rposition(|m| m.role == Role::User)?;
    if contains_directive(&messages[last_user].content) {
        tracing::debug!("last user message already carries a directive");
        return None;
    }

    let idx = choice_index(messages, last_user)?;

    let applied = match difficulty {
        Difficulty::Normal => return None,
        Difficulty::Extreme => {
            if idx != 1 {
                return None;
            }
            AppliedDirective {
                kind: DirectiveKind::ExtremeFailure,
                choice_index: idx,
                probability: 1.0,
                roll: None,
            }
        }
        Difficulty::Hard(curve) => {
            let p = curve.death_probability(idx);
            let roll = deterministic_roll(chat_id, idx, &messages[last_user].content);
            let kind = if p > 0.0 && roll < p {
                DirectiveKind::HardDeath
            } else {
                DirectiveKind::HardContinue
            };
            AppliedDirective {
                kind,
                choice_index: idx,
                probability: p,
                roll: Some(roll),
            }
        }
    };

    let target = &mut messages[last_user];
    target.content = format!("{}\n\n{}", target.content.trim_end(), applied.kind.text());

    tracing::debug!(
        chat_id,
        choice_index = applied.choice_index,
        probability = applied.probability,
        kind = ?applied.kind,
        "difficulty directive applied"
    );

    Some(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn game(choices: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("Start a pirate adventure")];
        for i in 0..choices {
            messages.push(Message::assistant(format!("Turn {}", i + 1)));
            messages.push(Message::user(format!("{}", i % 2 + 1)));
        }
        messages
    }

    #[test]
    fn test_choice_index_counts_user_after_assistant() {
        let messages = game(3);
        assert_eq!(choice_index(&messages, 0), None);
        assert_eq!(choice_index(&messages, 2), Some(1));
        assert_eq!(choice_index(&messages, 4), Some(2));
        assert_eq!(choice_index(&messages, 6), Some(3));
        assert_eq!(choice_index(&messages, 1), None);
    }

    #[test]
    fn test_curve_shape() {
        let curve = HardCurve::default();
        assert_eq!(curve.death_probability(1), 0.0);
        assert_eq!(curve.death_probability(2), 0.0);
        assert!((curve.death_probability(3) - 0.05).abs() < 1e-9);
        assert!((curve.death_probability(12) - 0.40).abs() < 1e-9);
        assert!((curve.death_probability(50) - 0.40).abs() < 1e-9);

        let mid = curve.death_probability(7);
        assert!(mid > 0.05 && mid < 0.40);
    }

    #[test]
    fn test_roll_is_deterministic() {
        let a = deterministic_roll("chat-1", 4, "2");
        let b = deterministic_roll("chat-1", 4, "2");
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, deterministic_roll("chat-2", 4, "2"));
    }

    #[test]
    fn test_normal_is_untouched() {
        let mut messages = game(2);
        let before = messages.clone();
        assert!(apply_directive(&mut messages, &Difficulty::Normal, "c").is_none());
        assert_eq!(messages, before);
    }

    #[test]
    fn test_extreme_fires_on_first_choice_only() {
        let mut first = game(1);
        let applied = apply_directive(&mut first, &Difficulty::Extreme, "c").unwrap();
        assert_eq!(applied.kind, DirectiveKind::ExtremeFailure);
        assert!(first.last().unwrap().content.starts_with("1\n\n<GAME_DIRECTIVE>EXTREME MODE"));

        let mut second = game(2);
        assert!(apply_directive(&mut second, &Difficulty::Extreme, "c").is_none());
    }

    #[test]
    fn test_hard_grace_period_continues() {
        let mut messages = game(1);
        let applied =
            apply_directive(&mut messages, &Difficulty::Hard(HardCurve::default()), "c").unwrap();
        assert_eq!(applied.kind, DirectiveKind::HardContinue);
        assert_eq!(applied.probability, 0.0);
        assert!(messages.last().unwrap().content.contains("HARD MODE: Continue"));
    }

    #[test]
    fn test_hard_certain_death() {
        let curve = HardCurve {
            grace_choices: 0,
            min_p: 1.0,
            max_p: 1.0,
            ramp_choices: 1,
        };
        let mut messages = game(1);
        let applied = apply_directive(&mut messages, &Difficulty::Hard(curve), "c").unwrap();
        assert_eq!(applied.kind, DirectiveKind::HardDeath);
    }

    #[test]
    fn test_existing_directive_is_respected() {
        let mut messages = game(1);
        messages.last_mut().unwrap().content = "1\n\n<GAME_DIRECTIVE>x</GAME_DIRECTIVE>".into();
        let before = messages.clone();
        assert!(apply_directive(&mut messages, &Difficulty::Extreme, "c").is_none());
        assert_eq!(messages, before);
    }

    #[test]
    fn test_pre_game_message_is_not_a_choice() {
        let mut messages = vec![Message::user("Start")];
        assert!(apply_directive(&mut messages, &Difficulty::Extreme, "c").is_none());
    }

    #[test]
    fn test_difficulty_from_yaml() {
        let hard: Difficulty = serde_yaml::from_str("mode: hard\nmax_p: 0.5\n").unwrap();
        match hard {
            Difficulty::Hard(curve) => {
                assert_eq!(curve.max_p, 0.5);
                assert_eq!(curve.grace_choices, 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let extreme: Difficulty = serde_yaml::from_str("mode: extreme\n").unwrap();
        assert_eq!(extreme, Difficulty::Extreme);
    }

    proptest! {
        #[test]
        fn prop_probability_within_bounds(idx in 0u32..200) {
            let curve = HardCurve::default();
            let p = curve.death_probability(idx);
            prop_assert!(p == 0.0 || (curve.min_p..=curve.max_p).contains(&p));
        }

        #[test]
        fn prop_probability_non_decreasing(idx in 1u32..200) {
            let curve = HardCurve::default();
            prop_assert!(curve.death_probability(idx + 1) >= curve.death_probability(idx));
        }
    }
}
