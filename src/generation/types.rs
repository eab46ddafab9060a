use super::error::{GenerationError, GenerationResult};
use super::tracker::{LiveToken, OutputTracker};

/// Flags passed to a [`Generator`](super::Generator) for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Return one raw score vector per generated token.
    pub return_logits: bool,
    /// Return attention rows per generated token (expensive; off unless needed).
    pub return_attentions: bool,
    /// Upper bound on generated tokens per sample.
    pub max_new_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            return_logits: true,
            return_attentions: false,
            max_new_tokens: crate::constants::DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

/// What the per-step score vectors hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreKind {
    /// Unnormalised logits; normalised once per step by the extractor.
    #[default]
    Logits,
    /// Already log-probabilities.
    LogProbs,
}

/// Attention of the newest query position for one generation step.
///
/// `weights` is row-major `[layer][head][key position]`; every row has the same
/// length, the sequence length at that step.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionStep {
    num_layers: usize,
    num_heads: usize,
    weights: Vec<f32>,
}

impl AttentionStep {
    /// Wraps `weights`, checking that they split evenly into `num_layers * num_heads` rows.
    pub fn new(num_layers: usize, num_heads: usize, weights: Vec<f32>) -> GenerationResult<Self> {
        let rows = num_layers * num_heads;
        if rows == 0 || weights.is_empty() || weights.len() % rows != 0 {
            return Err(GenerationError::InvalidAttentionShape {
                num_layers,
                num_heads,
                len: weights.len(),
            });
        }

        Ok(Self {
            num_layers,
            num_heads,
            weights,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Number of key positions attended over.
    pub fn seq_len(&self) -> usize {
        self.weights.len() / (self.num_layers * self.num_heads)
    }

    /// One attention row per (layer, head), layer-major.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.weights.chunks_exact(self.seq_len())
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// Everything the model produced for one sample of a batch.
///
/// Owned by the orchestrator for exactly one batch and dropped before the next
/// generation call.
#[derive(Debug)]
pub struct GenerationOutput {
    /// Prompt text that was encoded.
    pub prompt: String,
    /// Prompt token ids.
    pub input_ids: Vec<u32>,
    /// Newly generated token ids (prompt excluded, end-of-sequence excluded).
    pub generated_ids: Vec<u32>,
    /// Decoded continuation.
    pub generated_text: String,
    /// One full-vocabulary score vector per generated token.
    pub scores: Vec<Vec<f32>>,
    /// Whether `scores` are logits or log-probabilities.
    pub score_kind: ScoreKind,
    /// One [`AttentionStep`] per generated token, when requested.
    pub attentions: Option<Vec<AttentionStep>>,
    _live: Option<LiveToken>,
}

impl GenerationOutput {
    pub fn new(
        prompt: impl Into<String>,
        input_ids: Vec<u32>,
        generated_ids: Vec<u32>,
        generated_text: impl Into<String>,
        scores: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            input_ids,
            generated_ids,
            generated_text: generated_text.into(),
            scores,
            score_kind: ScoreKind::Logits,
            attentions: None,
            _live: None,
        }
    }

    pub fn with_score_kind(mut self, score_kind: ScoreKind) -> Self {
        self.score_kind = score_kind;
        self
    }

    pub fn with_attentions(mut self, attentions: Vec<AttentionStep>) -> Self {
        self.attentions = Some(attentions);
        self
    }

    /// Registers this output with `tracker` until it is dropped.
    pub fn tracked(mut self, tracker: &OutputTracker) -> Self {
        self._live = Some(tracker.register());
        self
    }

    /// Number of generated tokens.
    pub fn num_generated(&self) -> usize {
        self.generated_ids.len()
    }

    /// Number of prompt tokens.
    pub fn prompt_len(&self) -> usize {
        self.input_ids.len()
    }
}
