//! Similarity scoring: how well a generated answer is grounded in its inputs.
//!
//! - `attention`: mean share of stabilized attention mass placed on the prompt.
//! - `sbert`: cosine similarity of sentence embeddings of reference and answer.
//!
//! Similarity is optional; when disabled the row field is "not applicable", which is
//! distinct from a zero score.

/// Attention-mass aggregation.
pub mod attention;
mod error;


pub use attention::stabilize;
pub use error::SimilarityError;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::dataset::Sample;
use crate::embedding::{SentenceEmbedder, cosine_similarity_f16};
use crate::generation::GenerationOutput;

/// Tag that disables similarity scoring.
pub const SIMILARITY_DISABLED_TAG: &str = "none";

/// Closed set of similarity methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityMethod {
    Attention,
    Sbert,
}

impl SimilarityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Attention => "attention",
            SimilarityMethod::Sbert => "sbert",
        }
    }

    /// Parses a tag where `none` (or an empty string) means disabled.
    pub fn parse_optional(tag: &str) -> Result<Option<Self>, SimilarityError> {
        let trimmed = tag.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SIMILARITY_DISABLED_TAG) {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }

    /// Whether generation has to return attention weights for this method.
    pub fn requires_attentions(&self) -> bool {
        matches!(self, SimilarityMethod::Attention)
    }
}

impl FromStr for SimilarityMethod {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attention" => Ok(SimilarityMethod::Attention),
            "sbert" => Ok(SimilarityMethod::Sbert),
            _ => Err(SimilarityError::UnsupportedMethod { tag: s.to_string() }),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method tag plus score; `score` is `None` when there was nothing to aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    pub method: SimilarityMethod,
    pub score: Option<f64>,
}

/// Scores samples under one configured method.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    method: SimilarityMethod,
    embedder: Option<Arc<SentenceEmbedder>>,
}

impl SimilarityScorer {
    /// Attention-based scorer.
    pub fn attention() -> Self {
        Self {
            method: SimilarityMethod::Attention,
            embedder: None,
        }
    }

    /// Embedding-based scorer.
    pub fn sbert(embedder: Arc<SentenceEmbedder>) -> Self {
        Self {
            method: SimilarityMethod::Sbert,
            embedder: Some(embedder),
        }
    }

    /// Builds a scorer for `method`; `sbert` needs an embedder.
    pub fn new(
        method: SimilarityMethod,
        embedder: Option<Arc<SentenceEmbedder>>,
    ) -> Result<Self, SimilarityError> {
        match method {
            SimilarityMethod::Attention => Ok(Self::attention()),
            SimilarityMethod::Sbert => embedder
                .map(Self::sbert)
                .ok_or(SimilarityError::MissingEmbedder),
        }
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    /// Scores one sample.
    pub fn score(
        &self,
        sample: &Sample,
        output: &GenerationOutput,
    ) -> Result<SimilarityResult, SimilarityError> {
        let score = match self.method {
            SimilarityMethod::Attention => {
                let steps = output
                    .attentions
                    .as_deref()
                    .ok_or(SimilarityError::MissingAttentions)?;
                attention::prompt_grounding(steps, output.prompt_len())?
            }
            SimilarityMethod::Sbert => Some(self.embedding_similarity(sample, output)?),
        };

        Ok(SimilarityResult {
            method: self.method,
            score,
        })
    }

    fn embedding_similarity(
        &self,
        sample: &Sample,
        output: &GenerationOutput,
    ) -> Result<f64, SimilarityError> {
        let embedder = self
            .embedder
            .as_deref()
            .ok_or(SimilarityError::MissingEmbedder)?;
        let reference = sample
            .primary_reference()
            .ok_or(SimilarityError::NoReference)?;

        debug!(
            reference_len = reference.len(),
            generated_len = output.generated_text.len(),
            "Embedding reference and generated answer"
        );

        let reference = embedder.embed(reference)?;
        let generated = embedder.embed(&output.generated_text)?;
        let cosine = cosine_similarity_f16(&reference, &generated)?;

        Ok((cosine as f64).clamp(-1.0, 1.0))
    }
}
