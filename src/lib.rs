//! Sieve library crate (used by the `sieve` binary and integration tests).
//!
//! Scores LLM answers to QA datasets for uncertainty, similarity and correctness,
//! streaming one row per sample to durable storage while holding at most one
//! batch of generation output in memory.
//!
//! # Public API Surface
//!
//! ## Pipeline
//! - [`Orchestrator`], [`RunSettings`], [`RunSummary`] - Batch-by-batch driver
//! - [`ResultRow`], [`Measurement`], [`Verdict`] - Persisted record and its sentinels
//! - [`RunManifest`] - Resumable-run progress record
//!
//! ## Scoring
//! - [`likelihood::extract`] - Per-token log-likelihood and entropy
//! - [`uncertainty::score`], [`UncertaintyMethod`] - Scalar uncertainty
//! - [`SimilarityScorer`], [`SimilarityMethod`] - Attention / embedding similarity
//! - [`correctness::evaluate`], [`MatchPolicy`] - Normalized answer matching
//!
//! ## Boundaries
//! - [`Generator`], [`ModelRegistry`], [`StubGenerator`], [`CandleGenerator`] - Generation
//! - [`ResultSink`], [`CsvSink`], [`DestinationMode`] - Persistence
//! - [`Sample`], [`DatasetName`], [`load_dataset`] - Datasets
//! - [`SentenceEmbedder`] - Sentence embeddings for `sbert`
//!
//! ## Test/Mock Support
//! [`MemorySink`] is available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod config;
pub mod constants;
pub mod correctness;
pub mod dataset;
pub mod embedding;
pub mod generation;
pub mod likelihood;
pub mod pipeline;
pub mod similarity;
pub mod sink;
pub mod uncertainty;

pub use config::{Config, ConfigError, Overrides};
pub use correctness::{CorrectnessError, MatchPolicy, normalize_answer};
pub use dataset::{DatasetError, DatasetName, Sample, load_dataset, sample_qa};
pub use embedding::{EmbedderConfig, EmbeddingError, SentenceEmbedder, cosine_similarity_f16};
pub use generation::{
    AttentionStep, CandleGenerator, GenerationError, GenerationOptions, GenerationOutput,
    Generator, GeneratorLoader, ModelRegistry, OutputTracker, ScoreKind, StubGenerator,
};
pub use likelihood::{LikelihoodError, LikelihoodTrace};
pub use pipeline::{
    BatchPhase, GenerationFailurePolicy, Measurement, Orchestrator, PipelineError, ResultRow,
    RunManifest, RunSettings, RunState, RunSummary, ScoringFailure, Verdict,
};
pub use similarity::{SimilarityError, SimilarityMethod, SimilarityResult, SimilarityScorer};
#[cfg(any(test, feature = "mock"))]
pub use sink::MemorySink;
pub use sink::{CsvSink, DestinationMode, ResultSink, SinkError};
pub use uncertainty::{UncertaintyError, UncertaintyMethod, UncertaintyResult};
