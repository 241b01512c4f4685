use std::{sync::Arc, time::Duration};

use super::{
    parser::parse_output,
    prompt::PromptBuilder,
    schema::StageSchema,
};
use crate::{
    config::GenerationConfig,
    error::{Error, Result},
    model::{GenerationRequest, LangModel, LangModelInference as _},
    value::{AgentInput, AgentOutput, Stage},
};

/// The agent responsible for one report stage.
///
/// The stage selects the prompt template and the field schema; all agents
/// share the same generation backend.
#[derive(Clone, Debug)]
pub struct Agent {
    stage: Stage,
    lm: LangModel,
    prompts: Arc<PromptBuilder>,
    generation: GenerationConfig,
    timeout: Duration,
}

impl Agent {
    pub fn new(
        stage: Stage,
        lm: LangModel,
        prompts: Arc<PromptBuilder>,
        generation: GenerationConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            stage,
            lm,
            prompts,
            generation,
            timeout,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn prompt(&self, input: &AgentInput) -> Result<String> {
        let schema = StageSchema::of(self.stage, input.report_type);
        self.prompts.render(self.stage, input, &schema)
    }

    /// Generates and parses this stage's output.
    ///
    /// Only an unavailable or timed-out generation service is an error. Output
    /// missing required fields comes back with low confidence instead.
    pub async fn run(&self, input: &AgentInput) -> Result<AgentOutput> {
        let schema = StageSchema::of(self.stage, input.report_type);
        let prompt = self.prompts.render(self.stage, input, &schema)?;
        let request = GenerationRequest::new(prompt, &self.generation);

        let text = match tokio::time::timeout(self.timeout, self.lm.generate(request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(Error::GenerationUnavailable {
                    stage: self.stage,
                    reason: format!("{:#}", e),
                });
            }
            Err(_) => {
                return Err(Error::GenerationUnavailable {
                    stage: self.stage,
                    reason: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        let parsed = parse_output(&text, &schema);
        if !parsed.missing.is_empty() {
            log::warn!(
                "{}",
                Error::MalformedOutput {
                    stage: self.stage,
                    missing: parsed.missing.clone(),
                }
            );
        }
        Ok(AgentOutput {
            stage: self.stage,
            text,
            fields: parsed.fields,
            confidence: parsed.confidence,
            missing_fields: parsed.missing,
            attempts: 1,
        })
    }
}
