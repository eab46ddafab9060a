use std::fmt;

use crate::constants::{SENTINEL_NOT_APPLICABLE, SENTINEL_UNAVAILABLE, SENTINEL_UNDEFINED};

/// A numeric field of a result row, or the reason it has no number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Value(f64),
    /// Computed, but the input was empty (e.g. no generated tokens).
    Undefined,
    /// The scoring step failed for this sample.
    Unavailable,
    /// Not requested for this run.
    NotApplicable,
}

impl Measurement {
    pub fn value(&self) -> Option<f64> {
        match self {
            Measurement::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Maps a scorer's `Option` (where `None` means undefined) into a measurement.
    pub fn from_score(score: Option<f64>) -> Self {
        score.map_or(Measurement::Undefined, Measurement::Value)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Value(v) => write!(f, "{}", v),
            Measurement::Undefined => f.write_str(SENTINEL_UNDEFINED),
            Measurement::Unavailable => f.write_str(SENTINEL_UNAVAILABLE),
            Measurement::NotApplicable => f.write_str(SENTINEL_NOT_APPLICABLE),
        }
    }
}

/// Correctness field of a result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct(bool),
    Unavailable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Correct(correct) => write!(f, "{}", correct),
            Verdict::Unavailable => f.write_str(SENTINEL_UNAVAILABLE),
        }
    }
}

/// One persisted record; written once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// `batch_index * batch_size + offset_within_batch`.
    pub id: u64,
    pub question: String,
    pub generated_answer: String,
    pub uncertainty: Measurement,
    pub correct: Verdict,
    pub similarity: Measurement,
}

impl ResultRow {
    /// Fields in [`RESULT_HEADER`](crate::constants::RESULT_HEADER) order.
    pub fn to_record(&self) -> [String; 6] {
        [
            self.id.to_string(),
            self.question.clone(),
            self.generated_answer.clone(),
            self.uncertainty.to_string(),
            self.correct.to_string(),
            self.similarity.to_string(),
        ]
    }
}
