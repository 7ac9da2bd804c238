//! Game state read back from a storyteller turn.

use crate::patterns::{CHOICE_LINE_PATTERN, INVENTORY_PATTERN, TURN_HEADER_PATTERN};
use serde::{Deserialize, Serialize};

/// Turn limit assumed when a turn carries no header.
pub const DEFAULT_TURN_MAX: u32 = 20;

/// What the player sees in the side panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub turn_current: u32,
    pub turn_max: u32,
    pub choice1: String,
    pub choice2: String,
    pub inventory: Vec<String>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            turn_current: 0,
            turn_max: DEFAULT_TURN_MAX,
            choice1: String::new(),
            choice2: String::new(),
            inventory: Vec::new(),
        }
    }
}

/// Extract the turn counter, the two choices and the inventory from a turn.
pub fn extract_game_state(turn_text: &str) -> GameState {
    let mut state = GameState::default();

    if let Some(caps) = TURN_HEADER_PATTERN.captures(turn_text) {
        state.turn_current = caps[1].parse().unwrap_or(0);
        state.turn_max = caps[2].parse().unwrap_or(DEFAULT_TURN_MAX);
    }

    let (choice1, choice2) = extract_choices(turn_text);
    state.choice1 = choice1;
    state.choice2 = choice2;

    if let Some(caps) = INVENTORY_PATTERN.captures(turn_text) {
        state.inventory = caps[1]
            .split(',')
            .map(|item| item.trim().trim_matches('*').trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
    }

    state
}

/// Collect choices "1" and "2", following indented continuation lines.
fn extract_choices(text: &str) -> (String, String) {
    let mut choices: [Vec<&str>; 2] = [Vec::new(), Vec::new()];
    let mut current: Option<usize> = None;

    for line in text.lines() {
        if let Some(caps) = CHOICE_LINE_PATTERN.captures(line) {
            current = match &caps[1] {
                "1" if choices[0].is_empty() => Some(0),
                "2" if choices[1].is_empty() => Some(1),
                _ => None,
            };
            if let (Some(slot), Some(body)) = (current, caps.get(2)) {
                choices[slot].push(body.as_str());
            }
            continue;
        }

        let continues = line.starts_with(char::is_whitespace) && !line.trim().is_empty();
        match current {
            Some(slot) if continues => choices[slot].push(line),
            _ => current = None,
        }
    }

    let [first, second] = choices;
    (collapse(&first), collapse(&second))
}

fn collapse(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
