use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// `config.json`, `tokenizer.json` or `model.safetensors` is absent.
    #[error("sentence embedder files missing under {dir}")]
    ModelNotFound { dir: PathBuf },

    #[error("failed to load embedder tokenizer from {dir}: {source}")]
    TokenizerLoad {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load BERT encoder from {dir}: {source}")]
    EncoderLoad {
        dir: PathBuf,
        #[source]
        source: candle_core::Error,
    },

    #[error("failed to tokenize text for embedding: {reason}")]
    Tokenization { reason: String },

    #[error("sentence encoder forward pass failed: {0}")]
    Forward(#[from] candle_core::Error),

    #[error("invalid embedder configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("embeddings differ in dimension: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}
