//! Instructions sent to the optimizer model.
//!
//! - [`build_tagging_instruction`] asks for edit markers around the tokens
//!   responsible for failures.
//! - [`build_rewrite_instruction`] asks for a rewrite of only those tokens.

use crate::optimizer::Failure;

/// Template for edit-region tagging.
pub const TAGGING_TEMPLATE: &str = r#"Analyze these incorrect examples and identify tokens in the prompt to optimize.
Wrap ONLY these tokens with <edit> and </edit> tags. Keep other parts unchanged.
Do not nest tags. Return the complete prompt and nothing else.

Incorrect Examples:
{examples}

Prompt:
{prompt}"#;

/// Template for rewriting the tagged regions.
pub const REWRITE_TEMPLATE: &str = r#"Optimize ONLY text between <edit> tags based on feedback.
Return the new prompt WITHOUT <edit> tags and nothing else.

Feedback:
{feedback}

Tagged Prompt:
{tagged_prompt}"#;

/// Render one failing example the way the optimizer sees it.
pub fn format_failure(failure: &Failure) -> String {
    format!(
        "Input: {}\nOutput: {}\nExpected: {}",
        failure.example.input, failure.response, failure.example.target
    )
}

/// Build the tagging instruction from the prompt and a failure sample.
pub fn build_tagging_instruction(prompt: &str, failures: &[Failure]) -> String {
    let examples = failures
        .iter()
        .map(format_failure)
        .collect::<Vec<_>>()
        .join("\n\n");

    TAGGING_TEMPLATE
        .replace("{examples}", &examples)
        .replace("{prompt}", prompt)
}

/// Build the rewrite instruction from a rendered tagged prompt and feedback.
pub fn build_rewrite_instruction(tagged_prompt: &str, feedback: &str) -> String {
    REWRITE_TEMPLATE
        .replace("{feedback}", feedback)
        .replace("{tagged_prompt}", tagged_prompt)
}
