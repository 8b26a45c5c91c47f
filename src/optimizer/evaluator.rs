//! Prompt scoring against a labeled dataset.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{Dataset, Example};
use crate::error::{OptimizeError, OptimizeResult};
use crate::llm::{CompletionClient, ModelRole};
use crate::matcher::{AnsTagMatcher, AnswerMatcher};
use crate::metrics;
use crate::prompt::Prompt;

/// An example the task model got wrong, with its raw response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub example: Example,
    pub response: String,
}

impl Failure {
    pub fn new(example: Example, response: impl Into<String>) -> Self {
        Self {
            example,
            response: response.into(),
        }
    }
}

/// Outcome of scoring one prompt on one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub correct: usize,
    pub total: usize,
    /// `correct / total`, always within `[0, 1]`.
    pub accuracy: f64,
    /// Mismatched examples in dataset order.
    pub failing: Vec<Failure>,
}

impl EvaluationResult {
    pub fn is_perfect(&self) -> bool {
        self.failing.is_empty()
    }
}

/// Anything that can score a prompt on a dataset.
///
/// [`Evaluator`] is the real implementation; the optimization loop only
/// depends on this trait.
#[async_trait]
pub trait PromptScorer: Send + Sync {
    async fn evaluate(&self, prompt: &Prompt, dataset: &Dataset)
        -> OptimizeResult<EvaluationResult>;
}

/// Scores prompts by querying the task role once per example.
pub struct Evaluator {
    client: Arc<dyn CompletionClient>,
    matcher: AnsTagMatcher,
    concurrency: usize,
    temperature: Option<f64>,
}

impl Evaluator {
    /// Sequential evaluator using `<ans>` tag matching.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            matcher: AnsTagMatcher,
            concurrency: 1,
            temperature: None,
        }
    }

    /// Allow up to `concurrency` task completions in flight. Results are
    /// still merged in dataset order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl PromptScorer for Evaluator {
    async fn evaluate(
        &self,
        prompt: &Prompt,
        dataset: &Dataset,
    ) -> OptimizeResult<EvaluationResult> {
        if dataset.is_empty() {
            return Err(OptimizeError::EmptyDataset);
        }

        let temperature = self.temperature;
        let requests: Vec<String> = dataset
            .iter()
            .map(|example| prompt.apply_to(&example.input))
            .collect();

        // `buffered` yields in submission order, so responses line up with examples.
        let responses: Vec<String> = stream::iter(requests)
            .map(|request| {
                let client = self.client.clone();
                async move {
                    client
                        .complete(ModelRole::Task, &request, temperature)
                        .await
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut correct = 0;
        let mut failing = Vec::new();
        for (example, response) in dataset.iter().zip(responses) {
            if self.matcher.matches(&response, &example.target) {
                correct += 1;
            } else {
                failing.push(Failure::new(example.clone(), response));
            }
        }

        let total = dataset.len();
        let accuracy = correct as f64 / total as f64;
        metrics::record_evaluation();
        debug!(correct, total, accuracy, "Evaluated prompt");

        Ok(EvaluationResult {
            correct,
            total,
            accuracy,
            failing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock client answering every task request with the same text.
    struct FixedClient {
        response: String,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(
            &self,
            role: ModelRole,
            _message: &str,
            _temperature: Option<f64>,
        ) -> Result<String, LlmError> {
            assert_eq!(role, ModelRole::Task);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    /// Mock client answering by lookup on the full request, with per-entry delays.
    struct LookupClient {
        answers: HashMap<String, (String, u64)>,
    }

    #[async_trait]
    impl CompletionClient for LookupClient {
        async fn complete(
            &self,
            _role: ModelRole,
            message: &str,
            _temperature: Option<f64>,
        ) -> Result<String, LlmError> {
            let (answer, delay_ms) = self
                .answers
                .get(message)
                .cloned()
                .ok_or_else(|| LlmError::ParseError(format!("unexpected request: {message}")))?;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(answer)
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(
            &self,
            _role: ModelRole,
            _message: &str,
            _temperature: Option<f64>,
        ) -> Result<String, LlmError> {
            Err(LlmError::RequestFailed("connection reset".to_string()))
        }
    }

    fn one_plus_one() -> Dataset {
        Dataset::from_pairs([("1+1", "2")])
    }

    #[tokio::test]
    async fn test_all_correct() {
        let evaluator = Evaluator::new(Arc::new(FixedClient::new("<ans>2</ans>")));

        let result = evaluator
            .evaluate(&Prompt::new("Answer:"), &one_plus_one())
            .await
            .unwrap();

        assert_eq!(result.accuracy, 1.0);
        assert!(result.failing.is_empty());
        assert!(result.is_perfect());
    }

    #[tokio::test]
    async fn test_all_wrong_reports_raw_response() {
        let evaluator = Evaluator::new(Arc::new(FixedClient::new("<ans>3</ans>")));

        let result = evaluator
            .evaluate(&Prompt::new("Answer:"), &one_plus_one())
            .await
            .unwrap();

        assert_eq!(result.accuracy, 0.0);
        assert_eq!(
            result.failing,
            vec![Failure::new(Example::new("1+1", "2"), "<ans>3</ans>")]
        );
    }

    #[tokio::test]
    async fn test_empty_dataset_is_an_error() {
        let client = Arc::new(FixedClient::new("<ans>2</ans>"));
        let evaluator = Evaluator::new(client.clone());

        let err = evaluator
            .evaluate(&Prompt::new("Answer:"), &Dataset::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::EmptyDataset));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_call_per_example_and_partial_accuracy() {
        let client = Arc::new(FixedClient::new("<ans>True</ans>"));
        let evaluator = Evaluator::new(client.clone());
        let dataset = Dataset::from_pairs([
            ("True and True is", "True"),
            ("True and False is", "False"),
            ("not False is", "True"),
            ("False or False is", "False"),
        ]);

        let result = evaluator
            .evaluate(&Prompt::new("Evaluate:"), &dataset)
            .await
            .unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.correct, 2);
        assert_eq!(result.total, 4);
        assert!((result.accuracy - 0.5).abs() < f64::EPSILON);
        assert!((0.0..=1.0).contains(&result.accuracy));
        let failing_inputs: Vec<_> = result
            .failing
            .iter()
            .map(|f| f.example.input.as_str())
            .collect();
        assert_eq!(failing_inputs, vec!["True and False is", "False or False is"]);
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent_with_deterministic_client() {
        let evaluator = Evaluator::new(Arc::new(FixedClient::new("<ans>3</ans>")));
        let dataset = Dataset::from_pairs([("1+1", "2"), ("1+2", "3")]);
        let prompt = Prompt::new("Answer:");

        let first = evaluator.evaluate(&prompt, &dataset).await.unwrap();
        let second = evaluator.evaluate(&prompt, &dataset).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_evaluation_keeps_dataset_order() {
        // Earlier examples answer slower, so completion order is reversed.
        let answers = HashMap::from([
            ("Q:\n\na".to_string(), ("<ans>x</ans>".to_string(), 30)),
            ("Q:\n\nb".to_string(), ("<ans>x</ans>".to_string(), 15)),
            ("Q:\n\nc".to_string(), ("<ans>x</ans>".to_string(), 0)),
        ]);
        let evaluator = Evaluator::new(Arc::new(LookupClient { answers })).with_concurrency(3);
        let dataset = Dataset::from_pairs([("a", "1"), ("b", "2"), ("c", "3")]);

        let result = evaluator
            .evaluate(&Prompt::new("Q:"), &dataset)
            .await
            .unwrap();

        let order: Vec<_> = result
            .failing
            .iter()
            .map(|f| f.example.input.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_task_answer_is_a_wrong_answer() {
        use crate::llm::{
            Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, RoleRoutedClient,
            Usage,
        };

        struct SilentProvider;

        #[async_trait]
        impl LlmProvider for SilentProvider {
            async fn generate(
                &self,
                request: GenerationRequest,
            ) -> Result<GenerationResponse, LlmError> {
                Ok(GenerationResponse {
                    id: "mock-id".to_string(),
                    model: request.model,
                    choices: vec![Choice {
                        index: 0,
                        message: Message {
                            role: "assistant".to_string(),
                            content: String::new(),
                        },
                        finish_reason: "stop".to_string(),
                    }],
                    usage: Usage::default(),
                })
            }
        }

        let client = RoleRoutedClient::shared(Arc::new(SilentProvider), "task", "optimizer");
        let evaluator = Evaluator::new(Arc::new(client));

        let result = evaluator
            .evaluate(&Prompt::new("Answer:"), &one_plus_one())
            .await
            .unwrap();

        assert_eq!(result.accuracy, 0.0);
        assert_eq!(
            result.failing,
            vec![Failure::new(Example::new("1+1", "2"), "")]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_a_wrong_answer() {
        let evaluator = Evaluator::new(Arc::new(FailingClient));

        let err = evaluator
            .evaluate(&Prompt::new("Answer:"), &one_plus_one())
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::Upstream(LlmError::RequestFailed(_))));
    }
}
