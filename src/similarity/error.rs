use thiserror::Error;

use crate::embedding::EmbeddingError;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("unsupported similarity method: {tag}")]
    UnsupportedMethod { tag: String },

    #[error("generation output carries no attention weights")]
    MissingAttentions,

    #[error("step {step}: attention weight is NaN")]
    NonFiniteAttention { step: usize },

    #[error("sample has no reference answer to compare against")]
    NoReference,

    #[error("sbert similarity requires a sentence embedder")]
    MissingEmbedder,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}
