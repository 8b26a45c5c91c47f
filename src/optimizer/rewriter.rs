//! Localized prompt rewriting.
//!
//! The optimizer model receives the tagged prompt and feedback and returns a
//! new prompt in which only the edit regions changed. The result:
//! - has no edit markers left
//! - is not empty
//! - has any wrapping code fence or quotes removed

use std::sync::Arc;

use tracing::{debug, warn};

use super::feedback::Feedback;
use crate::error::{OptimizeError, OptimizeResult, OutputStage};
use crate::llm::{CompletionClient, ModelRole};
use crate::prompt::{contains_markers, Prompt, TaggedPrompt};
use crate::prompts::build_rewrite_instruction;
use crate::utils::clean_model_text;

pub struct PromptRewriter {
    client: Arc<dyn CompletionClient>,
    temperature: f64,
}

impl PromptRewriter {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            temperature: 0.3,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Rewrite the editable regions of `tagged` following `feedback`.
    pub async fn rewrite(&self, tagged: &TaggedPrompt, feedback: &Feedback) -> OptimizeResult<Prompt> {
        let instruction = build_rewrite_instruction(&tagged.render(), &feedback.render());

        let response = self
            .client
            .complete(ModelRole::Optimizer, &instruction, Some(self.temperature))
            .await?;
        let candidate = clean_model_text(&response);

        if candidate.is_empty() {
            return Err(OptimizeError::malformed(
                OutputStage::Rewrite,
                "optimizer returned an empty prompt",
            ));
        }

        if contains_markers(&candidate) {
            warn!(candidate = %candidate, "Rewrite still contains edit markers");
            return Err(OptimizeError::malformed(
                OutputStage::Rewrite,
                "rewritten prompt still contains edit markers",
            ));
        }

        debug!(chars = candidate.len(), "Rewrote prompt");
        Ok(Prompt::new(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::optimizer::FeedbackSynthesizer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockOptimizer {
        response: String,
        seen: Mutex<Vec<String>>,
    }

    impl MockOptimizer {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for MockOptimizer {
        async fn complete(
            &self,
            role: ModelRole,
            message: &str,
            _temperature: Option<f64>,
        ) -> Result<String, LlmError> {
            assert_eq!(role, ModelRole::Optimizer);
            self.seen
                .lock()
                .expect("lock not poisoned")
                .push(message.to_string());
            Ok(self.response.clone())
        }
    }

    fn tagged() -> TaggedPrompt {
        TaggedPrompt::parse("<edit>Answer</edit> the question.").unwrap()
    }

    #[tokio::test]
    async fn test_rewrite_returns_clean_prompt() {
        let client = Arc::new(MockOptimizer::new(
            "Solve step by step, then answer the question.",
        ));
        let rewriter = PromptRewriter::new(client.clone());
        let feedback = FeedbackSynthesizer::default().synthesize(&[]);

        let prompt = rewriter.rewrite(&tagged(), &feedback).await.unwrap();

        assert_eq!(prompt.as_str(), "Solve step by step, then answer the question.");
        let seen = client.seen.lock().unwrap();
        assert!(seen[0].contains("Tagged Prompt:\n<edit>Answer</edit> the question."));
        assert!(seen[0].contains("Feedback:\nKey issues to fix:"));
    }

    #[tokio::test]
    async fn test_rewrite_strips_fence_and_quotes() {
        let client = Arc::new(MockOptimizer::new("```\n\"Think, then answer.\"\n```"));
        let rewriter = PromptRewriter::new(client);

        let prompt = rewriter
            .rewrite(&tagged(), &Feedback::default())
            .await
            .unwrap();
        assert_eq!(prompt.as_str(), "Think, then answer.");
    }

    #[tokio::test]
    async fn test_residual_markers_are_malformed() {
        let client = Arc::new(MockOptimizer::new("<edit>Respond</edit> to the question."));
        let rewriter = PromptRewriter::new(client);

        let err = rewriter
            .rewrite(&tagged(), &Feedback::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::MalformedOutput {
                stage: OutputStage::Rewrite,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_rewrite_is_malformed() {
        let client = Arc::new(MockOptimizer::new("```\n\n```"));
        let rewriter = PromptRewriter::new(client);

        let err = rewriter
            .rewrite(&tagged(), &Feedback::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizeError::MalformedOutput { .. }));
    }
}
