use std::sync::Arc;

use super::{CancelToken, IssueKind, RunState, StageIssue, WorkflowRun};
use crate::{
    agent::{Agent, PromptBuilder},
    config::{GenerationConfig, OrchestratorConfig},
    error::{Error, Result},
    knowledge::Retriever,
    model::LangModel,
    utils::{Backoff, sleep},
    value::{AgentInput, AgentOutput, Stage},
};

enum StageOutcome {
    Accepted(AgentOutput),
    /// Best attempt after exhausting low-confidence retries.
    LowConfidence(AgentOutput),
    Failed(StageIssue),
    Cancelled,
}

/// Drives a [`WorkflowRun`] through its stages.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    retriever: Retriever,
    lm: LangModel,
    prompts: Arc<PromptBuilder>,
    generation: GenerationConfig,
    config: OrchestratorConfig,
    backoff: Backoff,
}

impl Orchestrator {
    pub fn new(
        retriever: Retriever,
        lm: LangModel,
        prompts: Arc<PromptBuilder>,
        generation: GenerationConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backoff: Backoff::new(config.backoff_base_ms, config.backoff_max_ms),
            retriever,
            lm,
            prompts,
            generation,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn agent(&self, stage: Stage) -> Agent {
        Agent::new(
            stage,
            self.lm.clone(),
            self.prompts.clone(),
            self.generation.clone(),
            self.config.generation_timeout(),
        )
    }

    fn cancel(&self, run: &mut WorkflowRun, stage: Option<Stage>) -> Result<RunState> {
        log::info!("run {}: cancelled before {:?}", run.id(), stage);
        run.fail(StageIssue::from_error(stage, &Error::Cancelled))?;
        Ok(run.state())
    }

    /// Runs every remaining stage and leaves `run` in a terminal state.
    ///
    /// Stage failures are recorded on the run; an `Err` means the run itself
    /// was misused, e.g. executed twice.
    pub async fn execute(&self, run: &mut WorkflowRun, cancel: &CancelToken) -> Result<RunState> {
        run.start()?;
        log::info!(
            "run {}: started {} ({} stages)",
            run.id(),
            run.report_type(),
            run.report_type().stages().len()
        );

        while let Some(stage) = run.next_stage() {
            if cancel.is_cancelled() {
                return self.cancel(run, Some(stage));
            }

            let retrieval = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.retriever.retrieve(stage, run.patient(), run.report_type(), run.outputs()) => Some(r),
            };
            let context = match retrieval {
                None => return self.cancel(run, Some(stage)),
                Some(Ok(context)) => context,
                Some(Err(e)) => {
                    log::error!("run {}: {} retrieval failed: {}", run.id(), stage, e);
                    run.fail(StageIssue::from_error(Some(stage), &e))?;
                    return Ok(run.state());
                }
            };
            log::debug!("run {}: {} with {} context chunks", run.id(), stage, context.len());

            let input = AgentInput {
                report_type: run.report_type(),
                patient: run.patient().clone(),
                context,
                upstream: run.outputs().to_vec(),
            };
            let outcome = self.run_stage(run.id(), stage, &input, cancel).await;
            if cancel.is_cancelled() {
                return self.cancel(run, Some(stage));
            }
            match outcome {
                StageOutcome::Accepted(output) => {
                    log::info!(
                        "run {}: {} accepted (confidence {:.2}, {} attempts)",
                        run.id(),
                        stage,
                        output.confidence,
                        output.attempts
                    );
                    run.append(output)?;
                }
                StageOutcome::LowConfidence(output) => {
                    let mut message = format!(
                        "confidence {:.2} below threshold {:.2} after {} attempts",
                        output.confidence, self.config.confidence_threshold, output.attempts
                    );
                    if !output.missing_fields.is_empty() {
                        message.push_str(&format!("; missing {}", output.missing_fields.join(", ")));
                    }
                    log::warn!("run {}: {} flagged: {}", run.id(), stage, message);
                    run.flag(StageIssue::new(Some(stage), IssueKind::LowConfidence, message))?;
                    run.append(output)?;
                }
                StageOutcome::Failed(issue) => {
                    log::error!("run {}: {}", run.id(), issue);
                    run.fail(issue)?;
                    return Ok(run.state());
                }
                StageOutcome::Cancelled => return self.cancel(run, Some(stage)),
            }
        }

        let state = run.finish()?;
        log::info!("run {}: finished as {:?}", run.id(), state);
        Ok(state)
    }

    async fn run_stage(
        &self,
        run_id: &str,
        stage: Stage,
        input: &AgentInput,
        cancel: &CancelToken,
    ) -> StageOutcome {
        let agent = self.agent(stage);
        let threshold = self.config.confidence_threshold;
        let mut attempts = 0;
        let mut generation_failures = 0;
        let mut low_confidence_retries = 0;
        let mut best: Option<AgentOutput> = None;

        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StageOutcome::Cancelled,
                r = agent.run(input) => r,
            };
            match result {
                Ok(mut output) => {
                    output.attempts = attempts;
                    if output.confidence >= threshold {
                        return StageOutcome::Accepted(output);
                    }
                    log::warn!(
                        "run {}: {} attempt {} confidence {:.2} below {:.2}",
                        run_id,
                        stage,
                        attempts,
                        output.confidence,
                        threshold
                    );
                    let best_output = match best.take() {
                        Some(prev) if prev.confidence >= output.confidence => AgentOutput {
                            attempts,
                            ..prev
                        },
                        _ => output,
                    };
                    if low_confidence_retries >= self.config.max_low_confidence_retries {
                        return StageOutcome::LowConfidence(best_output);
                    }
                    best = Some(best_output);
                    low_confidence_retries += 1;
                }
                Err(e @ Error::GenerationUnavailable { .. }) => {
                    if generation_failures >= self.config.max_generation_retries {
                        return StageOutcome::Failed(StageIssue::new(
                            Some(stage),
                            IssueKind::GenerationUnavailable,
                            format!("{} (after {} attempts)", e, attempts),
                        ));
                    }
                    let delay = self.backoff.delay(generation_failures);
                    generation_failures += 1;
                    log::warn!(
                        "run {}: {} retry {}/{} in {:?}: {}",
                        run_id,
                        stage,
                        generation_failures,
                        self.config.max_generation_retries,
                        delay,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return StageOutcome::Cancelled,
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => return StageOutcome::Failed(StageIssue::from_error(Some(stage), &e)),
            }
        }
    }
}
