use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation model not found at path: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("failed to load generation model '{model}': {reason}")]
    ModelLoadFailed { model: String, reason: String },

    #[error("tokenization failed: {reason}")]
    TokenizationFailed { reason: String },

    #[error("generation inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("prompt of {tokens} tokens plus {max_new_tokens} new tokens exceeds context window {context_window}")]
    PromptTooLong {
        tokens: usize,
        max_new_tokens: usize,
        context_window: usize,
    },

    #[error("attention of {len} weights does not split into {num_layers} layers x {num_heads} heads")]
    InvalidAttentionShape {
        num_layers: usize,
        num_heads: usize,
        len: usize,
    },

    #[error("backend returned {actual} outputs for a batch of {expected}")]
    OutputCountMismatch { expected: usize, actual: usize },
}

impl From<candle_core::Error> for GenerationError {
    fn from(err: candle_core::Error) -> Self {
        GenerationError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
