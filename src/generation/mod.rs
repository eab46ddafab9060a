//! The generation boundary: one call per batch, one [`GenerationOutput`] per sample.
//!
//! - [`Generator`] is the seam the orchestrator depends on.
//! - [`ModelRegistry`] loads each model identifier once per process.
//! - [`StubGenerator`] is a deterministic backend that needs no model files.
//! - [`CandleGenerator`] runs a Qwen2 GGUF model with greedy decoding.

/// Candle-backed Qwen2 generator.
pub mod backend;
pub mod error;
pub(crate) mod model;
/// Process-wide model cache.
pub mod registry;
/// Deterministic stub backend.
pub mod stub;
/// Live-output instrumentation.
pub mod tracker;
mod types;


pub use backend::CandleGenerator;
pub use error::{GenerationError, GenerationResult};
pub use registry::{DefaultLoader, GeneratorLoader, ModelRegistry};
pub use stub::StubGenerator;
pub use tracker::OutputTracker;
pub use types::{AttentionStep, GenerationOptions, GenerationOutput, ScoreKind};

use crate::dataset::Sample;

/// A loaded model that turns a batch of samples into generation outputs.
pub trait Generator: Send + Sync {
    /// Identifier the model was loaded under.
    fn model_id(&self) -> &str;

    /// Whether [`GenerationOptions::return_attentions`] can be honoured.
    fn supports_attentions(&self) -> bool;

    /// Generates for every sample of `batch`, in order.
    ///
    /// Either every output is returned or the whole batch fails.
    fn generate(
        &self,
        batch: &[Sample],
        options: &GenerationOptions,
    ) -> GenerationResult<Vec<GenerationOutput>>;
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &v)| match best {
            Some((_, bv)) if bv >= v || v.is_nan() => best,
            _ if v.is_nan() => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}
