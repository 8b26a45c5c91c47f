//! Local prompt optimization.
//!
//! - [`Evaluator`] scores a prompt and collects failing examples.
//! - [`EditTagger`] asks the optimizer model to mark the tokens to revise.
//! - [`FeedbackSynthesizer`] turns failures into fixed improvement directives.
//! - [`PromptRewriter`] rewrites only the marked regions.
//! - [`LocalPromptOptimizer`] runs the rounds and keeps the best prompt.

pub mod evaluator;
pub mod feedback;
pub mod lpo;
pub mod rewriter;
pub mod tagger;

pub use evaluator::{EvaluationResult, Evaluator, Failure, PromptScorer};
pub use feedback::{
    FailureCategory, FailureClassifier, Feedback, FeedbackSynthesizer, GlyphClassifier,
    FEEDBACK_HEADER,
};
pub use lpo::{LocalPromptOptimizer, OptimizationReport, RoundOutcome, RoundRecord, StopReason};
pub use rewriter::PromptRewriter;
pub use tagger::EditTagger;
