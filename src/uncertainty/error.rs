use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UncertaintyError {
    #[error("unsupported uncertainty method: {tag}")]
    UnsupportedMethod { tag: String },

    #[error("trace has {log_likelihoods} log-likelihoods but {entropies} entropies")]
    LengthMismatch {
        log_likelihoods: usize,
        entropies: usize,
    },

    #[error("non-finite input at token {index}")]
    NonFiniteInput { index: usize },

    #[error("{method} score overflowed")]
    Overflow { method: &'static str },
}
