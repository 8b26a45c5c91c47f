//! Edit-region tagging by the optimizer model.

use std::sync::Arc;

use tracing::debug;

use super::evaluator::Failure;
use crate::error::{OptimizeError, OptimizeResult, OutputStage};
use crate::llm::{CompletionClient, ModelRole};
use crate::prompt::{Prompt, TaggedPrompt};
use crate::prompts::build_tagging_instruction;
use crate::utils::strip_code_fence;

/// Asks the optimizer role which tokens of a prompt caused failures.
pub struct EditTagger {
    client: Arc<dyn CompletionClient>,
    temperature: f64,
    sample_limit: usize,
    require_verbatim: bool,
}

impl EditTagger {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            temperature: 0.3,
            sample_limit: 3,
            require_verbatim: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Number of failing examples shown to the optimizer.
    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    /// Reject responses whose text differs from the source prompt beyond markers.
    pub fn with_verbatim_check(mut self, required: bool) -> Self {
        self.require_verbatim = required;
        self
    }

    /// Tag `prompt` given the failures it produced.
    ///
    /// # Errors
    ///
    /// `Upstream` when the completion fails, `MalformedOutput` when the
    /// response has unbalanced or nested markers, or (with the verbatim check
    /// on) changes text it was told to leave alone.
    pub async fn tag(&self, prompt: &Prompt, failures: &[Failure]) -> OptimizeResult<TaggedPrompt> {
        let sample = &failures[..failures.len().min(self.sample_limit)];
        let instruction = build_tagging_instruction(prompt.as_str(), sample);

        let response = self
            .client
            .complete(ModelRole::Optimizer, &instruction, Some(self.temperature))
            .await?;

        let tagged = TaggedPrompt::parse(strip_code_fence(&response))
            .map_err(|e| OptimizeError::malformed(OutputStage::Tagging, e.to_string()))?;

        if self.require_verbatim && !tagged.preserves(prompt) {
            return Err(OptimizeError::malformed(
                OutputStage::Tagging,
                "text outside the edit markers differs from the source prompt",
            ));
        }

        debug!(
            regions = tagged.edit_region_count(),
            sampled_failures = sample.len(),
            "Tagged prompt"
        );
        Ok(tagged)
    }
}
