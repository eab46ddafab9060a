//! Cross-cutting, shared constants.
//!
//! Numeric constants that feed a score are part of the output contract: changing one
//! changes every persisted row, so rows from runs with different values are not
//! comparable.

/// Default number of samples per generation call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default cap on generated tokens per sample.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 64;

/// Default max tokens fed to the sentence embedder.
pub const DEFAULT_EMBEDDER_MAX_SEQ_LEN: usize = 256;

/// Lower clamp applied to attention weights before `ln(1 + w)`.
pub const ATTENTION_EPSILON: f64 = 1e-10;

/// A row of attention whose transformed mass falls below this is skipped.
pub const MIN_ATTENTION_MASS: f64 = 1e-30;

/// Progress is logged every time this many rows have been persisted.
pub const PROGRESS_EVERY: u64 = 100;

/// Rendering of [`Measurement::Undefined`](crate::pipeline::Measurement::Undefined).
pub const SENTINEL_UNDEFINED: &str = "undefined";

/// Rendering of a scoring step that failed for a sample.
pub const SENTINEL_UNAVAILABLE: &str = "unavailable";

/// Rendering of a measurement that was not requested.
pub const SENTINEL_NOT_APPLICABLE: &str = "NA";

/// Column order of every persisted result record.
pub const RESULT_HEADER: [&str; 6] = [
    "id",
    "question",
    "generated_answer",
    "uncertainty",
    "correct",
    "similarity_score",
];
