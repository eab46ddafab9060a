use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LikelihoodError {
    #[error("{scores} score vectors for {generated} generated tokens")]
    LengthMismatch { scores: usize, generated: usize },

    #[error("step {step}: token {token} outside vocabulary of {vocab_size}")]
    TokenOutOfVocabulary {
        step: usize,
        token: u32,
        vocab_size: usize,
    },

    #[error("step {step}: empty score vector")]
    EmptyDistribution { step: usize },

    #[error("step {step}: score vector holds NaN or +inf, or no finite entry")]
    NonFiniteScores { step: usize },

    #[error("step {step}: log-probabilities are positive or do not sum to one")]
    InvalidLogProbability { step: usize },

    #[error("step {step}: generated token {token} has zero probability")]
    ZeroProbabilityToken { step: usize, token: u32 },
}
