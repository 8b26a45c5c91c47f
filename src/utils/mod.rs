//! Shared utility functions for prompt-forge.
//!
//! Cleanup helpers for free-text optimizer responses.

pub mod text;

pub use text::{clean_model_text, strip_code_fence};
