//! Sentence embeddings for the `sbert` similarity method.
//!
//! Use [`EmbedderConfig::stub`] for tests and demos without model files.

/// Mean-pooled BERT encoder.
pub mod bert;
/// Embedder configuration.
pub mod config;
/// Model placement (CPU or a compiled-in accelerator).
pub mod device;
mod error;
/// Tokenizer loading helpers.
pub mod utils;


pub use config::{EmbedderConfig, STUB_EMBEDDING_DIM};
pub use error::EmbeddingError;

use candle_core::{Device, Tensor};
use half::f16;
use parking_lot::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use bert::BertSentenceEncoder;
use device::select_device;
use utils::load_embedding_tokenizer;

enum EmbedderBackend {
    Model {
        encoder: Mutex<BertSentenceEncoder>,
        tokenizer: Tokenizer,
        device: Device,
    },
    Stub,
}

/// Sentence embedder producing unit-normalized `f16` vectors.
pub struct SentenceEmbedder {
    backend: EmbedderBackend,
    config: EmbedderConfig,
    dim: usize,
}

impl std::fmt::Debug for SentenceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEmbedder")
            .field(
                "backend",
                &match &self.backend {
                    EmbedderBackend::Model { device, .. } => format!("Model({:?})", device),
                    EmbedderBackend::Stub => "Stub".to_string(),
                },
            )
            .field("dim", &self.dim)
            .field("max_seq_len", &self.config.max_seq_len)
            .finish()
    }
}

impl SentenceEmbedder {
    /// Loads the embedder from a config (stub mode is supported).
    pub fn load(config: EmbedderConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;

        if config.testing_stub {
            warn!("Sentence embedder running in STUB mode (testing only)");
            let dim = config.stub_dim;
            return Ok(Self {
                backend: EmbedderBackend::Stub,
                config,
                dim,
            });
        }

        let device = select_device();
        debug!(?device, "Selected compute device for sentence embedder");

        let tokenizer = load_embedding_tokenizer(&config.model_dir, config.max_seq_len)
            .map_err(|source| EmbeddingError::TokenizerLoad {
                dir: config.model_dir.clone(),
                source,
            })?;

        let encoder = BertSentenceEncoder::load(&config.model_dir, &device).map_err(|source| {
            EmbeddingError::EncoderLoad {
                dir: config.model_dir.clone(),
                source,
            }
        })?;
        let dim = encoder.hidden_size();

        info!(
            model_dir = %config.model_dir.display(),
            dim,
            max_seq_len = config.max_seq_len,
            "Sentence embedder loaded"
        );

        Ok(Self {
            backend: EmbedderBackend::Model {
                encoder: Mutex::new(encoder),
                tokenizer,
                device,
            },
            config,
            dim,
        })
    }

    /// Embeds one text. An empty text (or one that tokenizes to nothing) yields a zero vector.
    pub fn embed(&self, text: &str) -> Result<Vec<f16>, EmbeddingError> {
        match &self.backend {
            EmbedderBackend::Model {
                encoder,
                tokenizer,
                device,
            } => self.embed_with_model(text, encoder, tokenizer, device),
            EmbedderBackend::Stub => Ok(self.embed_stub(text)),
        }
    }

    fn embed_with_model(
        &self,
        text: &str,
        encoder: &Mutex<BertSentenceEncoder>,
        tokenizer: &Tokenizer,
        device: &Device,
    ) -> Result<Vec<f16>, EmbeddingError> {
        let encoding =
            tokenizer
                .encode(text, true)
                .map_err(|e| EmbeddingError::Tokenization {
                    reason: e.to_string(),
                })?;

        let tokens = encoding.get_ids();
        if tokens.is_empty() {
            return Ok(vec![f16::from_f32(0.0); self.dim]);
        }

        debug!(
            text_len = text.len(),
            token_count = tokens.len(),
            "Generating sentence embedding"
        );

        let input_ids = Tensor::new(tokens, device)?.unsqueeze(0)?;
        let pooled = encoder.lock().encode(&input_ids)?;

        Ok(normalize_and_convert_f16(pooled))
    }

    /// Bag-of-words stub: each lowercase word maps to a seeded pseudo-random vector.
    ///
    /// Texts sharing words get positive similarity; identical word sets get 1.0.
    fn embed_stub(&self, text: &str) -> Vec<f16> {
        let mut embedding = vec![0.0f32; self.dim];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let digest = blake3::hash(word.as_bytes());
            let mut seed = [0u8; 8];
            seed.copy_from_slice(&digest.as_bytes()[..8]);
            let mut state = u64::from_le_bytes(seed);

            for slot in embedding.iter_mut() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                *slot += ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0;
            }
        }

        normalize_and_convert_f16(embedding)
    }

    /// Returns the output embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns `true` if running in stub mode.
    pub fn is_stub(&self) -> bool {
        matches!(self.backend, EmbedderBackend::Stub)
    }

    /// Returns the embedder configuration.
    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }
}

fn normalize_and_convert_f16(mut embedding: Vec<f32>) -> Vec<f16> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        for x in &mut embedding {
            *x /= norm;
        }
    }

    embedding.into_iter().map(f16::from_f32).collect()
}

/// Cosine similarity of two `f16` vectors, accumulated in `f32`.
///
/// Returns 0.0 when either vector has zero norm. Mismatched lengths are an error.
pub fn cosine_similarity_f16(a: &[f16], b: &[f16]) -> Result<f32, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (dot, norm_a_sq, norm_b_sq) =
        a.iter()
            .zip(b.iter())
            .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (av, bv)| {
                let av = av.to_f32();
                let bv = bv.to_f32();
                (dot + av * bv, na + av * av, nb + bv * bv)
            });

    let norm_a = norm_a_sq.sqrt();
    let norm_b = norm_b_sq.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        Ok(0.0)
    } else {
        Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
    }
}
