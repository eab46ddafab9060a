//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sieve::dataset::Sample;
use sieve::generation::{
    AttentionStep, GenerationError, GenerationOptions, GenerationOutput, GenerationResult,
    Generator, OutputTracker,
};

/// Vocabulary size of scripted outputs.
pub const VOCAB: usize = 8;

/// Question marker: the sample generates nothing (immediate end-of-sequence).
pub const EMPTY_MARKER: &str = "[empty]";

/// Question marker: score vectors do not line up with generated tokens.
pub const MISMATCH_MARKER: &str = "[mismatch]";

/// Builds `n` samples whose reference equals the scripted answer.
pub fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample::new(format!("Question {i}?"), "scripted answer"))
        .collect()
}

/// Deterministic generator double with failure injection and live-output checks.
pub struct ScriptedGenerator {
    tracker: OutputTracker,
    calls: AtomicUsize,
    fail_on_calls: Vec<usize>,
    short_on_calls: Vec<usize>,
    stop_after_call: Option<(usize, Arc<AtomicBool>)>,
    attentions: bool,
    batch_sizes: Mutex<Vec<usize>>,
    live_at_call: Mutex<Vec<usize>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            tracker: OutputTracker::new(),
            calls: AtomicUsize::new(0),
            fail_on_calls: Vec::new(),
            short_on_calls: Vec::new(),
            stop_after_call: None,
            attentions: true,
            batch_sizes: Mutex::new(Vec::new()),
            live_at_call: Mutex::new(Vec::new()),
        }
    }

    /// Fails the given zero-based generate calls.
    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on_calls = calls.to_vec();
        self
    }

    /// Returns one output too few on the given calls.
    pub fn short_on(mut self, calls: &[usize]) -> Self {
        self.short_on_calls = calls.to_vec();
        self
    }

    /// Raises `stop` while serving call `call`.
    pub fn stopping_after(mut self, call: usize, stop: Arc<AtomicBool>) -> Self {
        self.stop_after_call = Some((call, stop));
        self
    }

    pub fn without_attentions(mut self) -> Self {
        self.attentions = false;
        self
    }

    pub fn tracker(&self) -> &OutputTracker {
        &self.tracker
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    /// Outputs still alive when each generate call started.
    pub fn live_at_call(&self) -> Vec<usize> {
        self.live_at_call.lock().clone()
    }

    fn output_for(&self, sample: &Sample, options: &GenerationOptions) -> GenerationOutput {
        let prompt = sample.prompt_text();
        let input_ids: Vec<u32> = (0..4).collect();

        let (generated_ids, text, scores) = if sample.question.contains(EMPTY_MARKER) {
            (vec![], String::new(), vec![])
        } else if sample.question.contains(MISMATCH_MARKER) {
            (vec![1, 2], "scripted answer".to_string(), vec![logits(1)])
        } else {
            let ids = vec![1, 2, 3];
            let scores = ids.iter().map(|&id| logits(id)).collect();
            (ids, "scripted answer".to_string(), scores)
        };

        let scores = if options.return_logits { scores } else { vec![] };

        let mut output =
            GenerationOutput::new(prompt, input_ids.clone(), generated_ids.clone(), text, scores);
        if options.return_attentions {
            let steps = (0..generated_ids.len())
                .map(|step| {
                    let seq_len = input_ids.len() + step;
                    let mut weights = vec![1e-12f32; seq_len];
                    weights[0] = 0.6;
                    weights[seq_len - 1] = 0.4;
                    AttentionStep::new(1, 1, weights).expect("valid attention shape")
                })
                .collect();
            output = output.with_attentions(steps);
        }
        output.tracked(&self.tracker)
    }
}

/// Peaked logits favouring `token`.
pub fn logits(token: u32) -> Vec<f32> {
    let mut logits = vec![0.0f32; VOCAB];
    logits[token as usize] = 4.0;
    logits
}

impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn supports_attentions(&self) -> bool {
        self.attentions
    }

    fn generate(
        &self,
        batch: &[Sample],
        options: &GenerationOptions,
    ) -> GenerationResult<Vec<GenerationOutput>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().push(batch.len());
        self.live_at_call.lock().push(self.tracker.live());

        if let Some((stop_call, stop)) = &self.stop_after_call
            && *stop_call == call
        {
            stop.store(true, Ordering::Release);
        }

        if self.fail_on_calls.contains(&call) {
            return Err(GenerationError::InferenceFailed {
                reason: format!("injected failure on call {call}"),
            });
        }

        let mut outputs: Vec<GenerationOutput> = batch
            .iter()
            .map(|sample| self.output_for(sample, options))
            .collect();

        if self.short_on_calls.contains(&call) {
            outputs.pop();
        }

        Ok(outputs)
    }
}
