use std::path::PathBuf;

use crate::embedding::error::EmbeddingError;

/// Dimension of stub embeddings (matches all-MiniLM-L6-v2).
pub const STUB_EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone)]
/// Configuration for [`SentenceEmbedder`](super::SentenceEmbedder).
pub struct EmbedderConfig {
    /// Directory holding `config.json`, `model.safetensors` and `tokenizer.json`.
    pub model_dir: PathBuf,
    /// Max tokens to consider.
    pub max_seq_len: usize,
    /// Output dimension in stub mode (the model decides otherwise).
    pub stub_dim: usize,
    /// If true, run in deterministic stub mode (no model files required).
    pub testing_stub: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::new(),
            max_seq_len: crate::constants::DEFAULT_EMBEDDER_MAX_SEQ_LEN,
            stub_dim: STUB_EMBEDDING_DIM,
            testing_stub: false,
        }
    }
}

impl EmbedderConfig {
    /// Creates a config for a sentence-transformers model directory.
    pub fn new<P: Into<PathBuf>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    /// Creates a stub config (no model files; produces deterministic embeddings).
    pub fn stub() -> Self {
        Self {
            testing_stub: true,
            ..Default::default()
        }
    }

    /// Validates required fields for non-stub mode.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.max_seq_len == 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: "max_seq_len must be greater than zero".to_string(),
            });
        }

        if self.testing_stub {
            if self.stub_dim == 0 {
                return Err(EmbeddingError::InvalidConfig {
                    reason: "stub_dim must be greater than zero".to_string(),
                });
            }
            return Ok(());
        }

        if self.model_dir.as_os_str().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                reason: "model_dir is required (stubbing is disabled)".to_string(),
            });
        }

        if !self.model_available() {
            return Err(EmbeddingError::ModelNotFound {
                dir: self.model_dir.clone(),
            });
        }

        Ok(())
    }

    /// Returns `true` if weights, config and tokenizer are all present.
    pub fn model_available(&self) -> bool {
        ["config.json", "model.safetensors", "tokenizer.json"]
            .iter()
            .all(|name| self.model_dir.join(name).is_file())
    }
}
