//! Records of what moderation did to a turn.

use serde::{Deserialize, Serialize};

/// Which text a judge step let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FinalUsed {
    #[default]
    Original,
    Rewrite,
}

/// Trace of a single judge step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    /// Id of the step spec that produced this trace
    pub step_id: String,

    /// Display name of the step
    #[serde(default)]
    pub name: String,

    /// Judge verdict, absent if the judge call failed
    pub judge_pass: Option<bool>,

    /// Raw judge reply
    #[serde(default)]
    pub judge_response: String,

    /// Rewritten text, present only when a rewrite was produced
    pub rewrite_response: Option<String>,

    /// Whether the rewrite replaced the current turn
    pub used_rewrite: bool,

    /// Compare verdict, absent if no compare ran
    pub compare_pass: Option<bool>,

    /// Raw compare reply
    #[serde(default)]
    pub compare_response: String,

    pub final_used: FinalUsed,

    /// Error text if any call of this step failed
    pub error: Option<String>,
}

impl StepTrace {
    /// Start a trace for a step that has not run yet.
    pub fn new(step_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            judge_pass: None,
            judge_response: String::new(),
            rewrite_response: None,
            used_rewrite: false,
            compare_pass: None,
            compare_response: String::new(),
            final_used: FinalUsed::Original,
            error: None,
        }
    }

    /// Mark the step as failed; the original turn is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.used_rewrite = false;
        self.final_used = FinalUsed::Original;
    }
}

/// Output of a full judge pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub final_turn: String,

    /// True iff at least one step adopted its rewrite
    pub was_modified: bool,

    /// One trace per executed step, in execution order
    pub steps: Vec<StepTrace>,
}

impl PipelineResult {
    /// Result of a pipeline that had nothing to do.
    pub fn unchanged(turn: impl Into<String>) -> Self {
        Self {
            final_turn: turn.into(),
            was_modified: false,
            steps: Vec::new(),
        }
    }

    /// Assemble a result, deriving `was_modified` from the traces.
    pub fn from_steps(final_turn: String, steps: Vec<StepTrace>) -> Self {
        let was_modified = steps.iter().any(|s| s.final_used == FinalUsed::Rewrite);
        Self {
            final_turn,
            was_modified,
            steps,
        }
    }
}

/// Output of the refusal detector and corrector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefusalResult {
    pub final_turn: String,
    pub was_refusal: bool,

    /// Raw classifier reply, or the error text if the classifier failed
    pub classifier_response: String,

    pub was_corrected: bool,
}

impl RefusalResult {
    /// Result that leaves the turn untouched.
    pub fn passthrough(turn: impl Into<String>, classifier_response: impl Into<String>) -> Self {
        Self {
            final_turn: turn.into(),
            was_refusal: false,
            classifier_response: classifier_response.into(),
            was_corrected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_was_modified_follows_traces() {
        let mut kept = StepTrace::new("s1", "difficulty");
        kept.judge_pass = Some(true);

        let mut rewritten = StepTrace::new("s2", "tone");
        rewritten.judge_pass = Some(false);
        rewritten.used_rewrite = true;
        rewritten.final_used = FinalUsed::Rewrite;

        let result = PipelineResult::from_steps("x".into(), vec![kept.clone()]);
        assert!(!result.was_modified);

        let result = PipelineResult::from_steps("y".into(), vec![kept, rewritten]);
        assert!(result.was_modified);
    }

    #[test]
    fn test_fail_resets_to_original() {
        let mut trace = StepTrace::new("s1", "step");
        trace.used_rewrite = true;
        trace.final_used = FinalUsed::Rewrite;
        trace.fail("timeout");
        assert_eq!(trace.final_used, FinalUsed::Original);
        assert!(!trace.used_rewrite);
        assert_eq!(trace.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_final_used_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FinalUsed::Rewrite).unwrap(), "\"rewrite\"");
    }
}
