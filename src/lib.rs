//! prompt-forge: local prompt optimization against labeled datasets.
//!
//! A prompt is scored by a task model on a dataset. An optimizer model then
//! marks the tokens responsible for failures and rewrites only those, and the
//! best-scoring prompt across a bounded number of rounds is kept.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod matcher;
pub mod metrics;
pub mod optimizer;
pub mod prompt;
pub mod prompts;
pub mod utils;

pub use config::{ClientConfig, ConfigError, OptimizerConfig, RoundFailurePolicy};
pub use dataset::{load_dataset, Dataset, DatasetFormat, Example};
pub use error::{DatasetError, LlmError, OptimizeError, OptimizeResult, OutputStage};
pub use llm::{CompletionClient, LiteLlmClient, ModelRole, RoleRoutedClient};
pub use matcher::{AnsTagMatcher, AnswerMatcher};
pub use optimizer::{
    EvaluationResult, Evaluator, LocalPromptOptimizer, OptimizationReport, PromptScorer,
};
pub use prompt::{Prompt, TaggedPrompt};
