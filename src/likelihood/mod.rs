//! Likelihood extraction: raw per-step scores to per-token log-likelihood and entropy.
//!
//! All arithmetic is done in `f64`. Logits are normalized with a max-shifted
//! log-softmax once per step; log-probability scores are used as given.

mod error;

#[cfg(test)]
mod tests;

pub use error::LikelihoodError;

use crate::generation::{GenerationOutput, ScoreKind};

/// Per-token signals derived from one [`GenerationOutput`].
///
/// Both sequences have one entry per generated token and are empty when nothing
/// was generated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LikelihoodTrace {
    /// Log-probability of the token actually emitted at each step.
    pub token_log_likelihoods: Vec<f64>,
    /// Shannon entropy (nats) of each step's distribution.
    pub entropy_per_token: Vec<f64>,
}

impl LikelihoodTrace {
    pub fn len(&self) -> usize {
        self.token_log_likelihoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_log_likelihoods.is_empty()
    }
}

/// Builds the [`LikelihoodTrace`] of one generated sample.
///
/// Empty `scores` (immediate end-of-sequence, or logits not requested) give an empty
/// trace.
pub fn extract(output: &GenerationOutput) -> Result<LikelihoodTrace, LikelihoodError> {
    if output.scores.is_empty() {
        return Ok(LikelihoodTrace::default());
    }

    if output.scores.len() != output.generated_ids.len() {
        return Err(LikelihoodError::LengthMismatch {
            scores: output.scores.len(),
            generated: output.generated_ids.len(),
        });
    }

    let mut trace = LikelihoodTrace {
        token_log_likelihoods: Vec::with_capacity(output.scores.len()),
        entropy_per_token: Vec::with_capacity(output.scores.len()),
    };

    for (step, (scores, &token)) in output.scores.iter().zip(&output.generated_ids).enumerate() {
        let log_probs = match output.score_kind {
            ScoreKind::Logits => log_softmax(scores, step)?,
            ScoreKind::LogProbs => as_log_probs(scores, step)?,
        };

        let log_likelihood = *log_probs
            .get(token as usize)
            .ok_or(LikelihoodError::TokenOutOfVocabulary {
                step,
                token,
                vocab_size: log_probs.len(),
            })?;
        if !log_likelihood.is_finite() {
            return Err(LikelihoodError::ZeroProbabilityToken { step, token });
        }

        trace.token_log_likelihoods.push(log_likelihood);
        trace.entropy_per_token.push(entropy(&log_probs));
    }

    Ok(trace)
}

/// Numerically stable log-softmax.
///
/// `-inf` entries are allowed (zero probability); NaN, `+inf`, or a vector with no
/// finite entry is rejected.
pub fn log_softmax(logits: &[f32], step: usize) -> Result<Vec<f64>, LikelihoodError> {
    if logits.is_empty() {
        return Err(LikelihoodError::EmptyDistribution { step });
    }

    if logits.iter().any(|x| x.is_nan() || *x == f32::INFINITY) {
        return Err(LikelihoodError::NonFiniteScores { step });
    }

    let max = logits
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    if !max.is_finite() {
        return Err(LikelihoodError::NonFiniteScores { step });
    }

    let sum_exp: f64 = logits.iter().map(|&x| (x as f64 - max).exp()).sum();
    let log_sum_exp = max + sum_exp.ln();

    Ok(logits.iter().map(|&x| x as f64 - log_sum_exp).collect())
}

/// Rounding slack allowed above zero for supplied log-probabilities.
const LOG_PROB_TOLERANCE: f32 = 1e-5;

/// Allowed distance of a supplied distribution's total mass from 1.
const LOG_PROB_MASS_TOLERANCE: f64 = 1e-4;

fn as_log_probs(scores: &[f32], step: usize) -> Result<Vec<f64>, LikelihoodError> {
    if scores.is_empty() {
        return Err(LikelihoodError::EmptyDistribution { step });
    }

    if scores.iter().any(|x| x.is_nan()) {
        return Err(LikelihoodError::NonFiniteScores { step });
    }
    if scores.iter().any(|&x| x > LOG_PROB_TOLERANCE) {
        return Err(LikelihoodError::InvalidLogProbability { step });
    }

    let log_probs: Vec<f64> = scores.iter().map(|&x| x as f64).collect();
    let mass: f64 = log_probs.iter().map(|lp| lp.exp()).sum();
    if (mass - 1.0).abs() > LOG_PROB_MASS_TOLERANCE {
        return Err(LikelihoodError::InvalidLogProbability { step });
    }

    Ok(log_probs)
}

/// `-Σ p·ln p`, skipping zero-probability entries (`0·ln 0 = 0`).
fn entropy(log_probs: &[f64]) -> f64 {
    log_probs
        .iter()
        .filter(|lp| lp.is_finite())
        .map(|&lp| {
            let p = lp.exp();
            if p > 0.0 { -p * lp } else { 0.0 }
        })
        .sum()
}
