//! Fixed texts sent to models, and the canned test-mode turn.

/// Turn returned by the test mode without calling any model.
pub const TEST_MODE_RESPONSE: &str = r#"Turn 1 of 3

Ahoy! This be a test turn from the taleward engine. The wiring between yer chat client and the moderation engine works, and not a single model was called to write this.

Switch to another model name when ye want the storyteller and its judges at the helm.

1) Hoist the sails and start a real adventure
2) Stay in port and keep testin' the connection

Inventory: spyglass, test log"#;

/// Wrap a candidate turn for the refusal classifier.
pub fn classifier_payload(turn: &str) -> String {
    format!("Classify this response:\n\n{}", turn)
}

/// Ask a compare model to choose between the original and the rewritten turn.
pub fn compare_payload(original: &str, revised: &str, question: &str) -> String {
    format!(
        "ORIGINAL TURN:\n{}\n\nREVISED TURN:\n{}\n\n{} Answer YES or NO.",
        original, revised, question
    )
}
