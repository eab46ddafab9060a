//! Batch orchestration: dataset → generation → scoring → sink.
//!
//! ```text
//! INIT → LOADING → PROCESSING_BATCH* → DONE
//!                  └ GENERATE → SCORE_EACH_SAMPLE → PERSIST_BATCH → RELEASE_BATCH_MEMORY
//! ```
//!
//! Row ids are `batch_index * batch_size + offset`, so they are stable across runs of
//! the same configuration. Per-sample scoring failures become "unavailable" fields;
//! generation and persistence failures stop the run (generation failures may be
//! skipped per [`GenerationFailurePolicy`]).

pub mod error;
/// Resumable-run manifest.
pub mod manifest;
mod orchestrator;
mod row;
/// Run state machine.
pub mod state;


pub use error::{ManifestError, PipelineError, ScoringFailure};
pub use manifest::RunManifest;
pub use orchestrator::{
    GenerationFailurePolicy, Orchestrator, RunSettings, RunSummary, ScoredSample,
};
pub use row::{Measurement, ResultRow, Verdict};
pub use state::{BatchPhase, RunState};
