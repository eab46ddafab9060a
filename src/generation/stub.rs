use tracing::debug;

use crate::config::STUB_MODEL_ID;
use crate::dataset::Sample;

use super::error::GenerationResult;
use super::tracker::OutputTracker;
use super::types::{AttentionStep, GenerationOptions, GenerationOutput};
use super::{Generator, argmax};

const STUB_VOCAB: [&str; 16] = [
    "<eos>", "the", "answer", "is", "paris", "eight", "water", "seven", "blue", "red", "north",
    "gold", "yes", "no", "one", "two",
];

const EOS_ID: usize = 0;
const STUB_LAYERS: usize = 2;
const STUB_HEADS: usize = 2;
const MAX_STUB_TOKENS: u64 = 5;

/// Deterministic generator for tests and smoke runs (no model files).
///
/// Output depends only on the prompt text: the same prompt always yields the same
/// tokens, scores and attentions. Some prompts yield no tokens at all.
#[derive(Debug, Clone, Default)]
pub struct StubGenerator {
    tracker: Option<OutputTracker>,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches every produced output to `tracker`.
    pub fn with_tracker(tracker: OutputTracker) -> Self {
        Self {
            tracker: Some(tracker),
        }
    }

    fn seed(text: &str) -> u64 {
        let hash = blake3::hash(text.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    fn next_unit(state: &mut u64) -> f32 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (*state >> 32) as f32 / u32::MAX as f32
    }

    fn generate_one(
        &self,
        sample: &Sample,
        options: &GenerationOptions,
    ) -> GenerationResult<GenerationOutput> {
        let prompt = sample.prompt_text();
        let mut state = Self::seed(&prompt);

        let input_ids: Vec<u32> = prompt
            .split_whitespace()
            .map(|word| (Self::seed(word) % STUB_VOCAB.len() as u64) as u32)
            .collect();

        let num_tokens = ((state % (MAX_STUB_TOKENS + 1)) as usize).min(options.max_new_tokens);

        let mut generated_ids = Vec::with_capacity(num_tokens);
        let mut scores = Vec::with_capacity(num_tokens);
        let mut attentions = Vec::with_capacity(num_tokens);

        for step in 0..num_tokens {
            let mut logits: Vec<f32> = (0..STUB_VOCAB.len())
                .map(|_| Self::next_unit(&mut state) * 8.0 - 4.0)
                .collect();
            logits[EOS_ID] = -10.0;

            let next = argmax(&logits).unwrap_or(EOS_ID + 1) as u32;
            generated_ids.push(next);

            if options.return_logits {
                scores.push(logits);
            }

            if options.return_attentions {
                let seq_len = input_ids.len().max(1) + step;
                let weights = (0..STUB_LAYERS * STUB_HEADS)
                    .flat_map(|_| {
                        let raw: Vec<f32> = (0..seq_len)
                            .map(|_| Self::next_unit(&mut state).exp())
                            .collect();
                        let total: f32 = raw.iter().sum();
                        raw.into_iter().map(move |w| w / total)
                    })
                    .collect::<Vec<f32>>();
                attentions.push(AttentionStep::new(STUB_LAYERS, STUB_HEADS, weights)?);
            }
        }

        let generated_text = generated_ids
            .iter()
            .map(|&id| STUB_VOCAB[id as usize])
            .collect::<Vec<_>>()
            .join(" ");

        let mut output =
            GenerationOutput::new(prompt, input_ids, generated_ids, generated_text, scores);
        if options.return_attentions {
            output = output.with_attentions(attentions);
        }
        if let Some(ref tracker) = self.tracker {
            output = output.tracked(tracker);
        }
        Ok(output)
    }
}

impl Generator for StubGenerator {
    fn model_id(&self) -> &str {
        STUB_MODEL_ID
    }

    fn supports_attentions(&self) -> bool {
        true
    }

    fn generate(
        &self,
        batch: &[Sample],
        options: &GenerationOptions,
    ) -> GenerationResult<Vec<GenerationOutput>> {
        debug!(batch_len = batch.len(), "Generating batch (stub)");
        batch
            .iter()
            .map(|sample| self.generate_one(sample, options))
            .collect()
    }
}
