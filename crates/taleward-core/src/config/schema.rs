//! JSON Schema check for adventure documents.
//!
//! The raw document is checked against `schemas/adventure.schema.json` before
//! it is deserialized, so unknown keys and out-of-range timeouts are reported
//! with their JSON path instead of a serde message.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded adventure schema.
const ADVENTURE_SCHEMA_JSON: &str = include_str!("../../../../schemas/adventure.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(ADVENTURE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a raw adventure document against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_adventure_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document_passes() {
        let value = json!({
            "name": "Pirates",
            "adventure_prompt": "You are a storyteller.",
            "storyteller_model": "claude-haiku-4-5"
        });
        assert!(validate_adventure_schema(&value).is_ok());
    }

    #[test]
    fn test_missing_storyteller_fails() {
        let value = json!({ "name": "Pirates", "adventure_prompt": "x" });
        assert!(validate_adventure_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_key_fails() {
        let value = json!({
            "name": "Pirates",
            "adventure_prompt": "x",
            "storyteller_model": "m",
            "temperature": 0.3
        });
        let errors = validate_adventure_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_step_timeout_range() {
        let value = json!({
            "name": "Pirates",
            "adventure_prompt": "x",
            "storyteller_model": "m",
            "judge_steps": [{ "id": "s1", "judge_timeout": 0 }]
        });
        let errors = validate_adventure_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/judge_steps/0/judge_timeout")));
    }

    #[test]
    fn test_difficulty_mode_enum() {
        let bad = json!({
            "name": "Pirates",
            "adventure_prompt": "x",
            "storyteller_model": "m",
            "difficulty": { "mode": "nightmare" }
        });
        assert!(validate_adventure_schema(&bad).is_err());

        let good = json!({
            "name": "Pirates",
            "adventure_prompt": "x",
            "storyteller_model": "m",
            "difficulty": { "mode": "hard", "max_p": 0.5 }
        });
        assert!(validate_adventure_schema(&good).is_ok());
    }
}
