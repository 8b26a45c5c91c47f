//! Cleanup of free-text model responses.
//!
//! Optimizer models frequently wrap the prompt they return in a Markdown code
//! block or surrounding quotes even when told not to.

use std::sync::OnceLock;

use regex::Regex;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"^```[\w-]*[ \t]*\r?\n([\s\S]*?)\r?\n?```$").expect("fence regex is valid")
    })
}

/// Return the body of a response that consists of exactly one fenced block.
///
/// Text with anything outside the fence is returned unchanged (trimmed), since
/// the fence is then part of the content.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match fence_regex().captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => trimmed,
    }
}

/// Strip a wrapping code fence, then a single pair of wrapping double quotes.
pub fn clean_model_text(content: &str) -> String {
    let body = strip_code_fence(content).trim();
    let unquoted = body
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'))
        .unwrap_or(body);
    unquoted.trim().to_string()
}
