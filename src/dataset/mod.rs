//! Labeled datasets.
//!
//! Two on-disk layouts are supported:
//!
//! - BIG-Bench-Hard task files: `{"examples": [{"input": "...", "target": "..."}]}`
//! - GSM8K-style arrays: `[{"question": "...", "answer": "..."}]`

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatasetError;

/// A single labeled example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub target: String,
}

impl Example {
    pub fn new(input: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            target: target.into(),
        }
    }
}

/// An ordered sequence of examples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    examples: Vec<Example>,
}

impl Dataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    /// Build a dataset from `(input, target)` pairs.
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(input, target)| Example::new(input, target))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    /// The first `n` examples (all of them when `n` exceeds the length).
    pub fn limit(&self, n: usize) -> Self {
        Self::new(self.examples.iter().take(n).cloned().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Example;
    type IntoIter = std::slice::Iter<'a, Example>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}

/// Supported dataset file layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Bbh,
    Math,
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bbh" => Ok(DatasetFormat::Bbh),
            "math" | "gsm8k" => Ok(DatasetFormat::Math),
            other => Err(format!(
                "unknown dataset format '{other}' (expected 'bbh' or 'math')"
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BbhFile {
    examples: Vec<BbhExample>,
}

#[derive(Debug, Deserialize)]
struct BbhExample {
    input: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct MathExample {
    question: String,
    answer: String,
}

/// Load a dataset file in the given layout.
pub fn load_dataset(path: impl AsRef<Path>, format: DatasetFormat) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path_str.clone(),
        source,
    })?;

    let dataset = parse_dataset(&content, format).map_err(|source| DatasetError::Json {
        path: path_str.clone(),
        source,
    })?;

    if dataset.is_empty() {
        return Err(DatasetError::Empty(path_str));
    }

    debug!(path = %path_str, ?format, examples = dataset.len(), "Loaded dataset");
    Ok(dataset)
}

/// Parse dataset JSON already in memory.
pub fn parse_dataset(content: &str, format: DatasetFormat) -> Result<Dataset, serde_json::Error> {
    let examples = match format {
        DatasetFormat::Bbh => serde_json::from_str::<BbhFile>(content)?
            .examples
            .into_iter()
            .map(|e| Example::new(e.input, e.target))
            .collect(),
        DatasetFormat::Math => serde_json::from_str::<Vec<MathExample>>(content)?
            .into_iter()
            .map(|e| Example::new(e.question, e.answer))
            .collect(),
    };
    Ok(Dataset::new(examples))
}
