//! Judge pipeline.
//!
//! Each enabled step, in configured order, asks a judge model whether the
//! current turn is acceptable. A failing verdict triggers a rewrite and a
//! compare call; the rewrite replaces the turn only if the compare model
//! prefers it. The next step sees whatever text the previous one settled on.
//!
//! A step whose calls fail keeps the turn it was given and the pipeline moves
//! on. Only the final text is the caller's concern.

use crate::invoker::LlmInvoker;
use crate::prompts::compare_payload;
use std::sync::Arc;
use std::time::Duration;
use taleward_core::{
    enabled_in_order, parse_verdict, FinalUsed, JudgeStepSpec, Message, PipelineResult, StepTrace,
    COMPARE_DEFAULT, JUDGE_DEFAULT,
};

/// Runs judge steps over a turn.
#[derive(Clone)]
pub struct JudgePipeline {
    invoker: Arc<dyn LlmInvoker>,
}

impl JudgePipeline {
    pub fn new(invoker: Arc<dyn LlmInvoker>) -> Self {
        Self { invoker }
    }

    /// Run every enabled step in `steps` over `turn`.
    ///
    /// `history` is the conversation that produced `turn` (without it); it is
    /// only used as rewrite context.
    pub async fn run(
        &self,
        turn: &str,
        history: &[Message],
        steps: &[JudgeStepSpec],
    ) -> PipelineResult {
        let ordered = enabled_in_order(steps);
        if ordered.is_empty() {
            return PipelineResult::unchanged(turn);
        }

        let mut current = turn.to_string();
        let mut traces = Vec::with_capacity(ordered.len());

        for step in ordered {
            let (trace, adopted) = self.run_step(step, &current, history).await;

            tracing::info!(
                step_id = %trace.step_id,
                judge_pass = ?trace.judge_pass,
                compare_pass = ?trace.compare_pass,
                final_used = ?trace.final_used,
                "judge step finished"
            );

            if let Some(rewrite) = adopted {
                current = rewrite;
            }
            traces.push(trace);
        }

        PipelineResult::from_steps(current, traces)
    }

    /// Run one step; returns its trace and the rewrite if it was adopted.
    async fn run_step(
        &self,
        step: &JudgeStepSpec,
        current: &str,
        history: &[Message],
    ) -> (StepTrace, Option<String>) {
        let mut trace = StepTrace::new(step.id.as_str(), step.label());

        let judge_reply = match self
            .invoker
            .invoke(
                &[Message::user(current)],
                non_empty(&step.judge_prompt),
                &step.judge_model,
                Duration::from_secs(step.judge_timeout),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(step_id = %step.id, error = %e, "judge call failed, keeping turn");
                trace.fail(format!("judge call failed: {}", e));
                return (trace, None);
            }
        };

        let passed = parse_verdict(&judge_reply, JUDGE_DEFAULT);
        trace.judge_pass = Some(passed);
        trace.judge_response = judge_reply;
        if passed {
            return (trace, None);
        }

        let mut rewrite_context = history.to_vec();
        rewrite_context.push(Message::assistant(current));
        rewrite_context.push(Message::user(step.rewrite_instruction()));

        let rewrite = match self
            .invoker
            .invoke(
                &rewrite_context,
                non_empty(&step.rewrite_prompt),
                &step.rewrite_model,
                Duration::from_secs(step.rewrite_timeout),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(step_id = %step.id, error = %e, "rewrite call failed, keeping turn");
                trace.fail(format!("rewrite call failed: {}", e));
                return (trace, None);
            }
        };

        trace.rewrite_response = Some(rewrite.clone());
        if rewrite.trim().is_empty() {
            tracing::warn!(step_id = %step.id, "rewrite was empty, keeping turn");
            trace.fail("rewrite returned empty text");
            return (trace, None);
        }

        let payload = compare_payload(current, &rewrite, step.compare_question());
        let compare_reply = match self
            .invoker
            .invoke(
                &[Message::user(payload)],
                non_empty(&step.compare_prompt),
                &step.compare_model,
                Duration::from_secs(step.compare_timeout),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(step_id = %step.id, error = %e, "compare call failed, keeping turn");
                trace.fail(format!("compare call failed: {}", e));
                return (trace, None);
            }
        };

        let better = parse_verdict(&compare_reply, COMPARE_DEFAULT);
        trace.compare_pass = Some(better);
        trace.compare_response = compare_reply;

        if better {
            trace.used_rewrite = true;
            trace.final_used = FinalUsed::Rewrite;
            (trace, Some(rewrite))
        } else {
            (trace, None)
        }
    }
}

fn non_empty(prompt: &str) -> Option<&str> {
    (!prompt.trim().is_empty()).then_some(prompt)
}
