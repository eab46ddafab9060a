//! Uncertainty scoring: one scalar per sample from its [`LikelihoodTrace`].
//!
//! Every method is a pure reduction; higher always means more uncertain. An empty
//! trace scores as undefined (`score == None`), never NaN.

mod error;


pub use error::UncertaintyError;

use std::fmt;
use std::str::FromStr;

use crate::likelihood::LikelihoodTrace;

/// Closed set of uncertainty reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UncertaintyMethod {
    /// Mean negative log-likelihood.
    Mnll,
    /// `exp` of the mean negative log-likelihood.
    Perplexity,
    /// Mean per-token entropy.
    Entropy,
    /// Tail-weighted mean entropy; token `t` weighs `t + 1`.
    #[default]
    LastDe,
}

impl UncertaintyMethod {
    pub const ALL: [UncertaintyMethod; 4] = [
        UncertaintyMethod::Mnll,
        UncertaintyMethod::Perplexity,
        UncertaintyMethod::Entropy,
        UncertaintyMethod::LastDe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyMethod::Mnll => "mnll",
            UncertaintyMethod::Perplexity => "perplexity",
            UncertaintyMethod::Entropy => "entropy",
            UncertaintyMethod::LastDe => "lastde",
        }
    }
}

impl FromStr for UncertaintyMethod {
    type Err = UncertaintyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == tag)
            .ok_or_else(|| UncertaintyError::UnsupportedMethod { tag: s.to_string() })
    }
}

impl fmt::Display for UncertaintyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method tag plus score; `score` is `None` for an empty trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertaintyResult {
    pub method: UncertaintyMethod,
    pub score: Option<f64>,
}

impl UncertaintyResult {
    pub fn is_undefined(&self) -> bool {
        self.score.is_none()
    }
}

/// Scores `trace` under `method`.
pub fn score(
    trace: &LikelihoodTrace,
    method: UncertaintyMethod,
) -> Result<UncertaintyResult, UncertaintyError> {
    let log_likelihoods = &trace.token_log_likelihoods;
    let entropies = &trace.entropy_per_token;

    if log_likelihoods.len() != entropies.len() {
        return Err(UncertaintyError::LengthMismatch {
            log_likelihoods: log_likelihoods.len(),
            entropies: entropies.len(),
        });
    }

    if trace.is_empty() {
        return Ok(UncertaintyResult {
            method,
            score: None,
        });
    }

    let value = match method {
        UncertaintyMethod::Mnll => -mean(log_likelihoods)?,
        UncertaintyMethod::Perplexity => (-mean(log_likelihoods)?).exp(),
        UncertaintyMethod::Entropy => mean(entropies)?,
        UncertaintyMethod::LastDe => tail_weighted_mean(entropies)?,
    };

    if !value.is_finite() {
        return Err(UncertaintyError::Overflow {
            method: method.as_str(),
        });
    }

    Ok(UncertaintyResult {
        method,
        score: Some(value),
    })
}

/// Scores `trace` under the method named by `tag`.
///
/// Unknown tags are an error; there is no fallback method.
pub fn score_with_tag(
    trace: &LikelihoodTrace,
    tag: &str,
) -> Result<UncertaintyResult, UncertaintyError> {
    score(trace, tag.parse()?)
}

fn check_finite(values: &[f64]) -> Result<(), UncertaintyError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(UncertaintyError::NonFiniteInput { index }),
        None => Ok(()),
    }
}

fn mean(values: &[f64]) -> Result<f64, UncertaintyError> {
    check_finite(values)?;
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

fn tail_weighted_mean(values: &[f64]) -> Result<f64, UncertaintyError> {
    check_finite(values)?;
    let (weighted, total) = values
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(weighted, total), (t, &h)| {
            let w = (t + 1) as f64;
            (weighted + w * h, total + w)
        });
    Ok(weighted / total)
}
