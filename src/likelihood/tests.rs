use super::*;

fn output(generated_ids: Vec<u32>, scores: Vec<Vec<f32>>) -> GenerationOutput {
    GenerationOutput::new("Question: q Answer:", vec![1, 2, 3], generated_ids, "a", scores)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_empty_scores_give_empty_trace() {
    let trace = extract(&output(vec![], vec![])).unwrap();
    assert!(trace.is_empty());
    assert!(trace.entropy_per_token.is_empty());
}

#[test]
fn test_uniform_logits() {
    let trace = extract(&output(vec![2], vec![vec![0.0; 4]])).unwrap();
    assert_eq!(trace.len(), 1);
    assert_close(trace.token_log_likelihoods[0], -(4.0f64).ln());
    assert_close(trace.entropy_per_token[0], (4.0f64).ln());
}

#[test]
fn test_logits_are_shift_invariant() {
    let a = extract(&output(vec![0], vec![vec![1.0, 2.0, 3.0]])).unwrap();
    let b = extract(&output(vec![0], vec![vec![1001.0, 1002.0, 1003.0]])).unwrap();
    assert_close(a.token_log_likelihoods[0], b.token_log_likelihoods[0]);
    assert_close(a.entropy_per_token[0], b.entropy_per_token[0]);
}

#[test]
fn test_peaked_distribution_has_low_entropy() {
    let trace = extract(&output(vec![1, 1], vec![vec![0.0, 50.0, 0.0], vec![0.0, 0.0, 0.0]])).unwrap();
    assert!(trace.token_log_likelihoods[0] > -1e-6);
    assert!(trace.entropy_per_token[0] < 1e-6);
    assert!(trace.entropy_per_token[1] > trace.entropy_per_token[0]);
}

#[test]
fn test_negative_infinity_logits_contribute_no_entropy() {
    let trace = extract(&output(
        vec![0],
        vec![vec![0.0, 0.0, f32::NEG_INFINITY, f32::NEG_INFINITY]],
    ))
    .unwrap();
    assert_close(trace.token_log_likelihoods[0], -(2.0f64).ln());
    assert_close(trace.entropy_per_token[0], (2.0f64).ln());
}

#[test]
fn test_log_probs_used_as_given() {
    let log_probs = vec![(0.5f32).ln(), (0.25f32).ln(), (0.25f32).ln()];
    let out = output(vec![1], vec![log_probs]).with_score_kind(ScoreKind::LogProbs);
    let trace = extract(&out).unwrap();

    assert!((trace.token_log_likelihoods[0] - (0.25f64).ln()).abs() < 1e-6);
    let expected = -(0.5 * (0.5f64).ln() + 2.0 * 0.25 * (0.25f64).ln());
    assert!((trace.entropy_per_token[0] - expected).abs() < 1e-6);
}

#[test]
fn test_positive_log_prob_rejected() {
    let out = output(vec![0], vec![vec![0.5, -1.0]]).with_score_kind(ScoreKind::LogProbs);
    assert_eq!(
        extract(&out).unwrap_err(),
        LikelihoodError::InvalidLogProbability { step: 0 }
    );
}

#[test]
fn test_unnormalized_log_probs_rejected() {
    let out = output(vec![0], vec![vec![-5.0, -5.0]]).with_score_kind(ScoreKind::LogProbs);
    assert_eq!(
        extract(&out).unwrap_err(),
        LikelihoodError::InvalidLogProbability { step: 0 }
    );
}

#[test]
fn test_log_probs_with_zero_mass_entries_accepted() {
    let log_probs = vec![0.0f32, f32::NEG_INFINITY];
    let out = output(vec![0], vec![log_probs]).with_score_kind(ScoreKind::LogProbs);
    let trace = extract(&out).unwrap();

    assert_eq!(trace.token_log_likelihoods, vec![0.0]);
    assert_eq!(trace.entropy_per_token, vec![0.0]);
}

#[test]
fn test_length_mismatch() {
    let err = extract(&output(vec![0, 1], vec![vec![0.0; 3]])).unwrap_err();
    assert_eq!(
        err,
        LikelihoodError::LengthMismatch {
            scores: 1,
            generated: 2
        }
    );
}

#[test]
fn test_token_out_of_vocabulary() {
    let err = extract(&output(vec![7], vec![vec![0.0; 3]])).unwrap_err();
    assert!(matches!(
        err,
        LikelihoodError::TokenOutOfVocabulary {
            step: 0,
            token: 7,
            vocab_size: 3
        }
    ));
}

#[test]
fn test_nan_logits_rejected() {
    let err = extract(&output(vec![0], vec![vec![0.0, f32::NAN]])).unwrap_err();
    assert_eq!(err, LikelihoodError::NonFiniteScores { step: 0 });
}

#[test]
fn test_all_negative_infinity_rejected() {
    let err = extract(&output(vec![0], vec![vec![f32::NEG_INFINITY; 3]])).unwrap_err();
    assert_eq!(err, LikelihoodError::NonFiniteScores { step: 0 });
}

#[test]
fn test_zero_probability_token() {
    let err = extract(&output(vec![1], vec![vec![0.0, f32::NEG_INFINITY]])).unwrap_err();
    assert_eq!(err, LikelihoodError::ZeroProbabilityToken { step: 0, token: 1 });
}

#[test]
fn test_empty_step_rejected() {
    let err = extract(&output(vec![0], vec![vec![]])).unwrap_err();
    assert_eq!(err, LikelihoodError::EmptyDistribution { step: 0 });
}

#[test]
fn test_extract_is_deterministic() {
    let out = output(vec![0, 2], vec![vec![0.3, -1.2, 2.5], vec![1.0, 1.0, -3.0]]);
    assert_eq!(extract(&out).unwrap(), extract(&out).unwrap());
}

#[test]
fn test_log_softmax_sums_to_one() {
    let log_probs = log_softmax(&[0.5, -2.0, 3.25, 1.0], 0).unwrap();
    let total: f64 = log_probs.iter().map(|lp| lp.exp()).sum();
    assert_close(total, 1.0);
}
