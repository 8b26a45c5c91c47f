//! Answer extraction and normalization.
//!
//! Task responses are expected to wrap the final answer in `<ans>...</ans>`.
//! Matching compares normalized labels with plain string equality.

use std::sync::OnceLock;

use regex::Regex;

/// Normalizes raw model text into a comparable answer label.
pub trait AnswerMatcher: Send + Sync {
    /// Normalize a raw response. Must be total.
    fn normalize(&self, raw: &str) -> String;

    /// Whether a raw response answers `expected`.
    fn matches(&self, raw: &str, expected: &str) -> bool {
        self.normalize(raw) == normalize_label(expected)
    }
}

/// Extracts the first `<ans>` span, falling back to the whole response.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsTagMatcher;

fn ans_regex() -> &'static Regex {
    static ANS: OnceLock<Regex> = OnceLock::new();
    ANS.get_or_init(|| Regex::new(r"(?is)<ans>(.*?)</ans>").expect("answer regex is valid"))
}

impl AnswerMatcher for AnsTagMatcher {
    fn normalize(&self, raw: &str) -> String {
        match ans_regex().captures(raw).and_then(|caps| caps.get(1)) {
            Some(span) => normalize_label(span.as_str()),
            None => normalize_label(raw),
        }
    }
}

/// Trim and lowercase an expected label.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_ans_span() {
        let matcher = AnsTagMatcher;
        assert_eq!(matcher.normalize("Reasoning...\n<ans> True </ans>"), "true");
    }

    #[test]
    fn test_ans_tag_is_case_insensitive_and_multiline() {
        let matcher = AnsTagMatcher;
        assert_eq!(matcher.normalize("<ANS>\nFalse\n</ANS>"), "false");
    }

    #[test]
    fn test_first_span_wins() {
        let matcher = AnsTagMatcher;
        assert_eq!(matcher.normalize("<ans>2</ans> or <ans>3</ans>"), "2");
    }

    #[test]
    fn test_falls_back_to_full_text() {
        let matcher = AnsTagMatcher;
        assert_eq!(matcher.normalize("  Yes  "), "yes");
        assert_eq!(matcher.normalize("<ans>unterminated"), "<ans>unterminated");
    }

    #[test]
    fn test_matches_normalizes_expected() {
        let matcher = AnsTagMatcher;
        assert!(matcher.matches("<ans>2</ans>", " 2 "));
        assert!(matcher.matches("<ans>TRUE</ans>", "True"));
        assert!(!matcher.matches("<ans>3</ans>", "2"));
    }
}
