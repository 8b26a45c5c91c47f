//! Prompt values and edit-region tagging.
//!
//! A [`Prompt`] is the instruction text prepended to every task input. A
//! [`TaggedPrompt`] is the same text split into fixed and editable segments;
//! it only exists between edit tagging and rewriting.
//!
//! On the wire the optimizer model sees edit regions as inline markers:
//!
//! ```text
//! Please <edit>answer the question</edit>. Put ONLY the final answer in <ans> tags.
//! ```
//!
//! [`TaggedPrompt::parse`] turns that text into segments and rejects
//! unbalanced or nested markers, so nothing downstream ever handles raw
//! marker syntax.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opening edit-region marker.
pub const EDIT_OPEN: &str = "<edit>";

/// Closing edit-region marker.
pub const EDIT_CLOSE: &str = "</edit>";

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)<(/?)edit\s*>").expect("marker regex is valid"))
}

/// An immutable instruction prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the task request for one input: instructions first, then content.
    pub fn apply_to(&self, input: &str) -> String {
        format!("{}\n\n{}", self.0, input)
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// One span of a tagged prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that must be carried over unchanged.
    Fixed(String),
    /// Text the rewriter is allowed to revise.
    Editable(String),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Fixed(text) | Segment::Editable(text) => text,
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Segment::Editable(_))
    }
}

/// Marker syntax violations found while parsing a tagged prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("nested edit marker at byte {offset}")]
    Nested { offset: usize },

    #[error("closing edit marker without an opening marker at byte {offset}")]
    UnmatchedClose { offset: usize },

    #[error("edit marker opened at byte {offset} is never closed")]
    Unclosed { offset: usize },
}

/// A prompt split into fixed and editable segments.
///
/// Adjacent fixed segments are always merged and empty segments are dropped,
/// so two tagged prompts with the same regions compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedPrompt {
    segments: Vec<Segment>,
}

impl TaggedPrompt {
    /// Build a tagged prompt from segments, normalizing the layout.
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut tagged = Self::default();
        for segment in segments {
            match segment {
                Segment::Fixed(text) => tagged.push_fixed(&text),
                Segment::Editable(text) => tagged.push_editable(&text),
            }
        }
        tagged
    }

    /// Parse marker-delimited text into segments.
    ///
    /// Markers are matched case-insensitively (`<EDIT>` is accepted).
    pub fn parse(text: &str) -> Result<Self, MarkerError> {
        let mut tagged = Self::default();
        let mut cursor = 0;
        let mut open_at: Option<usize> = None;

        for caps in marker_regex().captures_iter(text) {
            let Some(marker) = caps.get(0) else {
                continue;
            };
            let closing = caps.get(1).is_some_and(|slash| !slash.as_str().is_empty());
            let body = &text[cursor..marker.start()];

            match (open_at, closing) {
                (None, false) => {
                    tagged.push_fixed(body);
                    open_at = Some(marker.start());
                }
                (Some(_), true) => {
                    tagged.push_editable(body);
                    open_at = None;
                }
                (Some(_), false) => {
                    return Err(MarkerError::Nested {
                        offset: marker.start(),
                    })
                }
                (None, true) => {
                    return Err(MarkerError::UnmatchedClose {
                        offset: marker.start(),
                    })
                }
            }
            cursor = marker.end();
        }

        if let Some(offset) = open_at {
            return Err(MarkerError::Unclosed { offset });
        }
        tagged.push_fixed(&text[cursor..]);
        Ok(tagged)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of editable regions.
    pub fn edit_region_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_editable()).count()
    }

    pub fn has_edit_regions(&self) -> bool {
        self.segments.iter().any(Segment::is_editable)
    }

    /// The editable spans, in prompt order.
    pub fn edit_regions(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|s| s.is_editable())
            .map(Segment::text)
    }

    /// The underlying prompt text with all markers removed.
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(Segment::text).collect()
    }

    /// Render back to marker syntax for the optimizer model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Fixed(text) => out.push_str(text),
                Segment::Editable(text) => {
                    out.push_str(EDIT_OPEN);
                    out.push_str(text);
                    out.push_str(EDIT_CLOSE);
                }
            }
        }
        out
    }

    /// Whether the text outside (and inside) the markers matches `prompt`,
    /// ignoring differences in whitespace runs.
    pub fn preserves(&self, prompt: &Prompt) -> bool {
        collapse_whitespace(&self.plain_text()) == collapse_whitespace(prompt.as_str())
    }

    fn push_fixed(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Fixed(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Fixed(text.to_string()));
        }
    }

    fn push_editable(&mut self, text: &str) {
        if !text.is_empty() {
            self.segments.push(Segment::Editable(text.to_string()));
        }
    }
}

impl fmt::Display for TaggedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Whether `text` still contains any edit marker.
pub fn contains_markers(text: &str) -> bool {
    marker_regex().is_match(text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_apply_puts_instructions_first() {
        let prompt = Prompt::new("Answer:");
        assert_eq!(prompt.apply_to("1+1"), "Answer:\n\n1+1");
    }

    #[test]
    fn test_parse_balanced_markers() {
        let tagged =
            TaggedPrompt::parse("Please <edit>answer</edit> the <edit>question</edit>.").unwrap();

        assert_eq!(
            tagged.segments(),
            &[
                Segment::Fixed("Please ".to_string()),
                Segment::Editable("answer".to_string()),
                Segment::Fixed(" the ".to_string()),
                Segment::Editable("question".to_string()),
                Segment::Fixed(".".to_string()),
            ]
        );
        assert_eq!(tagged.edit_region_count(), 2);
        assert_eq!(tagged.plain_text(), "Please answer the question.");
        assert_eq!(
            tagged.render(),
            "Please <edit>answer</edit> the <edit>question</edit>."
        );
    }

    #[test]
    fn test_parse_without_markers() {
        let tagged = TaggedPrompt::parse("Let's think step by step.").unwrap();
        assert!(!tagged.has_edit_regions());
        assert_eq!(tagged.render(), "Let's think step by step.");
    }

    #[test]
    fn test_parse_accepts_uppercase_markers() {
        let tagged = TaggedPrompt::parse("<EDIT>Think</EDIT> carefully").unwrap();
        assert_eq!(tagged.edit_regions().collect::<Vec<_>>(), vec!["Think"]);
        assert_eq!(tagged.render(), "<edit>Think</edit> carefully");
    }

    #[test]
    fn test_parse_rejects_nested_markers() {
        let err = TaggedPrompt::parse("a <edit>b <edit>c</edit></edit>").unwrap_err();
        assert_eq!(err, MarkerError::Nested { offset: 10 });
    }

    #[test]
    fn test_parse_rejects_unmatched_close() {
        let err = TaggedPrompt::parse("a </edit> b").unwrap_err();
        assert_eq!(err, MarkerError::UnmatchedClose { offset: 2 });
    }

    #[test]
    fn test_parse_rejects_unclosed_marker() {
        let err = TaggedPrompt::parse("a <edit>b").unwrap_err();
        assert_eq!(err, MarkerError::Unclosed { offset: 2 });
    }

    #[test]
    fn test_empty_regions_are_dropped() {
        let tagged = TaggedPrompt::parse("a<edit></edit>b").unwrap();
        assert_eq!(tagged.segments(), &[Segment::Fixed("ab".to_string())]);
    }

    #[test]
    fn test_from_segments_merges_fixed_text() {
        let tagged = TaggedPrompt::from_segments([
            Segment::Fixed("Be ".to_string()),
            Segment::Fixed("brief. ".to_string()),
            Segment::Editable("Show work.".to_string()),
        ]);
        assert_eq!(tagged.segments().len(), 2);
        assert_eq!(tagged.render(), "Be brief. <edit>Show work.</edit>");
    }

    #[test]
    fn test_preserves_ignores_whitespace_runs() {
        let prompt = Prompt::new("Answer the  question.\nBe brief.");
        let tagged = TaggedPrompt::parse("Answer <edit>the question.</edit> Be brief.").unwrap();
        assert!(tagged.preserves(&prompt));

        let altered = TaggedPrompt::parse("Answer <edit>the question.</edit> Be long.").unwrap();
        assert!(!altered.preserves(&prompt));
    }

    #[test]
    fn test_contains_markers() {
        assert!(contains_markers("x <edit>y"));
        assert!(contains_markers("x </EDIT> y"));
        assert!(!contains_markers("Put the answer in <ans></ans> tags."));
    }
}
