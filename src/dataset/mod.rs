//! QA datasets normalised into one [`Sample`] shape.
//!
//! Every corpus is read by its own loader (see [`loader`]) and flattened into the
//! same record, so scoring never branches on where a sample came from.

pub mod error;
pub mod loader;


pub use error::{DatasetError, DatasetResult};
pub use loader::{load_dataset, sample_qa};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correctness::MatchPolicy;

/// One question with its accepted answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// The question as asked.
    pub question: String,
    /// Accepted answers; any one of them counts as correct.
    #[serde(default)]
    pub references: Vec<String>,
    /// Full prompt override; when absent the prompt is built from the question.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Passage the question is asked against (CoQA stories).
    #[serde(default)]
    pub context: Option<String>,
}

impl Sample {
    /// Creates a sample with a single reference answer.
    pub fn new(question: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            references: vec![reference.into()],
            prompt: None,
            context: None,
        }
    }

    /// Creates a sample accepting any of `references`.
    pub fn with_references<I, S>(question: impl Into<String>, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            references: references.into_iter().map(Into::into).collect(),
            prompt: None,
            context: None,
        }
    }

    /// Sets the prompt override.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Sets the passage context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Text handed to the generator.
    pub fn prompt_text(&self) -> String {
        if let Some(ref prompt) = self.prompt {
            return prompt.clone();
        }

        match self.context {
            Some(ref context) => format!("{}\nQuestion: {} Answer:", context, self.question),
            None => format!("Question: {} Answer:", self.question),
        }
    }

    /// First reference answer, used where a single reference text is required.
    pub fn primary_reference(&self) -> Option<&str> {
        self.references
            .iter()
            .map(String::as_str)
            .find(|r| !r.trim().is_empty())
    }
}

/// Supported corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetName {
    SciQ,
    CoQa,
    TriviaQa,
    SampleQa,
}

impl DatasetName {
    /// Every supported dataset, in documentation order.
    pub const ALL: [DatasetName; 4] = [
        DatasetName::SciQ,
        DatasetName::CoQa,
        DatasetName::TriviaQa,
        DatasetName::SampleQa,
    ];

    /// Canonical lowercase name (also used in output file names).
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetName::SciQ => "sciq",
            DatasetName::CoQa => "coqa",
            DatasetName::TriviaQa => "triviaqa",
            DatasetName::SampleQa => "sampleqa",
        }
    }

    /// Answer-matching policy appropriate for the corpus.
    pub fn match_policy(&self) -> MatchPolicy {
        match self {
            DatasetName::SciQ | DatasetName::CoQa | DatasetName::TriviaQa => MatchPolicy::Contains,
            DatasetName::SampleQa => MatchPolicy::Exact,
        }
    }
}

impl FromStr for DatasetName {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == name)
            .ok_or_else(|| DatasetError::Unsupported {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
