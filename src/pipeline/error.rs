use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::correctness::CorrectnessError;
use crate::dataset::DatasetError;
use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;
use crate::likelihood::LikelihoodError;
use crate::similarity::SimilarityError;
use crate::sink::SinkError;
use crate::uncertainty::UncertaintyError;

/// Fatal errors; a run stops at the first one.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("orchestrator has already run")]
    AlreadyRun,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("failed to load model '{model}': {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: GenerationError,
    },

    #[error("failed to load sentence embedder: {0}")]
    Embedder(#[from] EmbeddingError),

    #[error("failed to open destination: {0}")]
    Destination(#[from] SinkError),

    #[error("batch {batch_index}: generation failed: {source}")]
    Generation {
        batch_index: usize,
        #[source]
        source: GenerationError,
    },

    #[error("batch {batch_index}: failed to persist row {id}: {source}")]
    Persistence {
        batch_index: usize,
        id: u64,
        #[source]
        source: SinkError,
    },

    #[error("failed to read run manifest: {0}")]
    ManifestRead(#[source] ManifestError),

    #[error("batch {batch_index}: failed to write run manifest: {source}")]
    Manifest {
        batch_index: usize,
        #[source]
        source: ManifestError,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A per-sample scoring step that failed; the row field becomes "unavailable".
#[derive(Debug, Error)]
pub enum ScoringFailure {
    #[error("likelihood: {0}")]
    Likelihood(#[from] LikelihoodError),

    #[error("uncertainty: {0}")]
    Uncertainty(#[from] UncertaintyError),

    #[error("similarity: {0}")]
    Similarity(#[from] SimilarityError),

    #[error("correctness: {0}")]
    Correctness(#[from] CorrectnessError),
}

impl ScoringFailure {
    /// Result column the failure blanked out.
    pub fn field(&self) -> &'static str {
        match self {
            ScoringFailure::Likelihood(_) | ScoringFailure::Uncertainty(_) => "uncertainty",
            ScoringFailure::Similarity(_) => "similarity_score",
            ScoringFailure::Correctness(_) => "correct",
        }
    }
}
