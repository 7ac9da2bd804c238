//! Shared text patterns.
//!
//! Regexes used to read storyteller turns and classifier replies. Kept in one
//! place so the refusal check and the game-state extractor agree on wording.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // CLASSIFIER REPLIES
    // =========================================================================

    /// Any affirmative refusal marker, matched as a plain substring.
    pub static ref REFUSAL_MARKER_PATTERN: Regex = Regex::new(
        r"(?i)yes|refusal|true|refusing|refused"
    ).unwrap();

    // =========================================================================
    // TURN STRUCTURE
    // =========================================================================

    /// "Turn 3 of 10" or "Turn 3/10", markdown emphasis tolerated.
    pub static ref TURN_HEADER_PATTERN: Regex = Regex::new(
        r"(?i)turn\s+(\d+)\s*(?:of|/)\s*(\d+)"
    ).unwrap();

    /// A numbered choice line: "1) ..." or "2. ...".
    pub static ref CHOICE_LINE_PATTERN: Regex = Regex::new(
        r"^\s*(\d+)[.)]\s+(.*)$"
    ).unwrap();

    /// "Inventory: a, b" with optional markdown around the label.
    pub static ref INVENTORY_PATTERN: Regex = Regex::new(
        r"(?im)^[\s*_]*inventory[\s*_]*:[\s*_]*(.+)$"
    ).unwrap();

    /// Marker that a user message already carries a game directive.
    pub static ref DIRECTIVE_MARKER_PATTERN: Regex = Regex::new(
        r"<GAME_DIRECTIVE>"
    ).unwrap();
}

/// Check if a classifier reply flags the candidate turn as a refusal.
///
/// Case-insensitive substring match against
/// `yes`, `refusal`, `true`, `refusing` and `refused`.
pub fn is_refusal_reply(reply: &str) -> bool {
    REFUSAL_MARKER_PATTERN.is_match(reply.trim())
}

/// Check if text already contains a game directive.
pub fn contains_directive(text: &str) -> bool {
    DIRECTIVE_MARKER_PATTERN.is_match(text)
}
