//! Correctness evaluation against reference answers.
//!
//! Both sides are normalized before comparison:
//! 1. lowercase (Unicode)
//! 2. drop every character that is neither alphanumeric nor whitespace
//! 3. drop the articles `a`, `an`, `the`
//! 4. collapse whitespace
//!
//! [`MatchPolicy`] then decides what counts as a match.

mod error;


pub use error::CorrectnessError;

use crate::dataset::Sample;
use crate::generation::GenerationOutput;

const ARTICLES: [&str; 3] = ["a", "an", "the"];

/// How a normalized answer is compared with normalized references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Answer equals some reference.
    Exact,
    /// Some reference occurs in the answer as a whole-word span.
    Contains,
}

/// Normalizes an answer for comparison.
pub fn normalize_answer(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|word| !ARTICLES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Judges `output` against the references of `sample`.
pub fn evaluate(
    sample: &Sample,
    output: &GenerationOutput,
    policy: MatchPolicy,
) -> Result<bool, CorrectnessError> {
    evaluate_text(&output.generated_text, &sample.references, policy)
}

/// Judges `generated` against `references`; references that normalize to nothing are
/// ignored.
pub fn evaluate_text<S: AsRef<str>>(
    generated: &str,
    references: &[S],
    policy: MatchPolicy,
) -> Result<bool, CorrectnessError> {
    let references: Vec<String> = references
        .iter()
        .map(|r| normalize_answer(r.as_ref()))
        .filter(|r| !r.is_empty())
        .collect();

    if references.is_empty() {
        return Err(CorrectnessError::NoReferences);
    }

    let generated = normalize_answer(generated);

    Ok(match policy {
        MatchPolicy::Exact => references.iter().any(|r| *r == generated),
        MatchPolicy::Contains => {
            let words: Vec<&str> = generated.split_whitespace().collect();
            references.iter().any(|r| contains_span(&words, r))
        }
    })
}

fn contains_span(words: &[&str], reference: &str) -> bool {
    let needle: Vec<&str> = reference.split_whitespace().collect();
    needle.len() <= words.len() && words.windows(needle.len()).any(|window| window == needle)
}
