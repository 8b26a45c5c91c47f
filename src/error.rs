//! Error types for prompt-forge operations.
//!
//! Defines the error types for each subsystem:
//! - Completion client (LLM API interactions)
//! - Dataset loading
//! - Prompt optimization (evaluation, tagging, rewriting, the round loop)

use std::fmt;

use thiserror::Error;

use crate::prompt::Prompt;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed dataset '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset '{0}' contains no examples")]
    Empty(String),
}

/// The stage of the loop whose optimizer output failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStage {
    Tagging,
    Rewrite,
}

impl fmt::Display for OutputStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStage::Tagging => write!(f, "edit tagging"),
            OutputStage::Rewrite => write!(f, "prompt rewrite"),
        }
    }
}

/// Errors that can occur during prompt evaluation and optimization.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("Upstream completion call failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("Malformed optimizer output during {stage}: {reason}")]
    MalformedOutput { stage: OutputStage, reason: String },

    #[error("Cannot evaluate a prompt against an empty dataset")]
    EmptyDataset,

    #[error("Optimization aborted in round {round} (best accuracy {best_score:.2})")]
    Aborted {
        round: usize,
        best_prompt: Prompt,
        best_score: f64,
        #[source]
        source: Box<OptimizeError>,
    },
}

impl OptimizeError {
    pub(crate) fn malformed(stage: OutputStage, reason: impl Into<String>) -> Self {
        OptimizeError::MalformedOutput {
            stage,
            reason: reason.into(),
        }
    }

    /// The best prompt confirmed before the failure, if the loop got that far.
    pub fn best_prompt(&self) -> Option<&Prompt> {
        match self {
            OptimizeError::Aborted { best_prompt, .. } => Some(best_prompt),
            _ => None,
        }
    }
}

/// Result type alias for optimization operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;
