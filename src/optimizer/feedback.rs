//! Categorical feedback from failing examples.
//!
//! Each sampled failure is classified into a coarse category and every
//! category contributes one fixed directive. No model call is involved.

use serde::{Deserialize, Serialize};

use super::evaluator::Failure;
use crate::prompts::format_failure;

/// Header line of every feedback text.
pub const FEEDBACK_HEADER: &str = "Key issues to fix:";

/// Characters that mark an example as arithmetic.
const ARITHMETIC_GLYPHS: [char; 5] = ['+', '-', '\u{2212}', '\u{00d7}', '\u{00f7}'];

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Math,
    Logic,
}

impl FailureCategory {
    /// The improvement directive for this category.
    pub fn directive(&self) -> &'static str {
        match self {
            FailureCategory::Math => "Ensure arithmetic steps are verified.",
            FailureCategory::Logic => "Clarify transitional logic between steps.",
        }
    }
}

/// Assigns a category to a failing example.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, failure: &Failure) -> FailureCategory;
}

/// Math when the rendered failure (input, response or expected answer)
/// contains an arithmetic operator, logic otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphClassifier;

impl FailureClassifier for GlyphClassifier {
    fn classify(&self, failure: &Failure) -> FailureCategory {
        if format_failure(failure).contains(ARITHMETIC_GLYPHS) {
            FailureCategory::Math
        } else {
            FailureCategory::Logic
        }
    }
}

/// Deduplicated improvement directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    directives: Vec<String>,
}

impl Feedback {
    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    fn push(&mut self, directive: &str) {
        if !self.directives.iter().any(|d| d == directive) {
            self.directives.push(directive.to_string());
        }
    }

    /// Bulleted list under [`FEEDBACK_HEADER`].
    pub fn render(&self) -> String {
        let mut out = FEEDBACK_HEADER.to_string();
        for directive in &self.directives {
            out.push_str("\n- ");
            out.push_str(directive);
        }
        out
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Turns failing examples into feedback.
pub struct FeedbackSynthesizer {
    classifier: Box<dyn FailureClassifier>,
    sample_limit: usize,
}

impl Default for FeedbackSynthesizer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FeedbackSynthesizer {
    /// Glyph-based synthesizer looking at the first `sample_limit` failures.
    pub fn new(sample_limit: usize) -> Self {
        Self {
            classifier: Box::new(GlyphClassifier),
            sample_limit,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Directives appear in the order their category is first seen.
    pub fn synthesize(&self, failures: &[Failure]) -> Feedback {
        let mut feedback = Feedback::default();
        for failure in failures.iter().take(self.sample_limit) {
            feedback.push(self.classifier.classify(failure).directive());
        }
        feedback
    }
}
