use crate::constants::{ATTENTION_EPSILON, MIN_ATTENTION_MASS};
use crate::generation::AttentionStep;

use super::error::SimilarityError;

/// `ln(1 + max(w, ε))`: finite and strictly positive for every non-NaN weight.
#[inline]
pub fn stabilize(weight: f32) -> f64 {
    (weight as f64).max(ATTENTION_EPSILON).ln_1p()
}

/// Share of one attention row's stabilized mass that falls on prompt positions.
///
/// `None` when the row carries no usable mass.
pub fn prompt_mass_ratio(row: &[f32], prompt_len: usize) -> Option<f64> {
    let split = prompt_len.min(row.len());
    let prompt: f64 = row[..split].iter().map(|&w| stabilize(w)).sum();
    let continuation: f64 = row[split..].iter().map(|&w| stabilize(w)).sum();
    let total = prompt + continuation;

    (total >= MIN_ATTENTION_MASS).then(|| prompt / total)
}

/// Mean prompt-mass ratio over every (step, layer, head) row.
///
/// `Ok(None)` when there are no steps to average.
pub fn prompt_grounding(
    steps: &[AttentionStep],
    prompt_len: usize,
) -> Result<Option<f64>, SimilarityError> {
    let mut sum = 0.0f64;
    let mut rows = 0usize;

    for (step, attention) in steps.iter().enumerate() {
        if attention.weights().iter().any(|w| w.is_nan()) {
            return Err(SimilarityError::NonFiniteAttention { step });
        }

        for ratio in attention
            .rows()
            .filter_map(|row| prompt_mass_ratio(row, prompt_len))
        {
            sum += ratio;
            rows += 1;
        }
    }

    Ok((rows > 0).then(|| sum / rows as f64))
}
