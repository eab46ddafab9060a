use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::constants::PROGRESS_EVERY;
use crate::correctness::{self, MatchPolicy};
use crate::dataset::{self, DatasetName, Sample};
use crate::embedding::{EmbedderConfig, SentenceEmbedder};
use crate::generation::{
    GenerationError, GenerationOptions, GenerationOutput, Generator, ModelRegistry,
};
use crate::likelihood;
use crate::similarity::{SIMILARITY_DISABLED_TAG, SimilarityMethod, SimilarityScorer};
use crate::sink::{CsvSink, DestinationMode, ResultSink};
use crate::uncertainty::{self, UncertaintyMethod};

use super::error::{PipelineError, ScoringFailure};
use super::manifest::RunManifest;
use super::row::{Measurement, ResultRow, Verdict};
use super::state::{BatchPhase, RunState};

/// What to do when the generator fails for a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationFailurePolicy {
    /// Stop the run with the failing batch index.
    #[default]
    Abort,
    /// Log, leave the batch's ids unused, and continue with the next batch.
    Skip,
}

impl GenerationFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationFailurePolicy::Abort => "abort",
            GenerationFailurePolicy::Skip => "skip",
        }
    }
}

impl FromStr for GenerationFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(GenerationFailurePolicy::Abort),
            "skip" => Ok(GenerationFailurePolicy::Skip),
            _ => Err(ConfigError::InvalidFailurePolicy {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for GenerationFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run scoring and batching settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub batch_size: usize,
    pub max_new_tokens: usize,
    pub uncertainty_method: UncertaintyMethod,
    pub match_policy: MatchPolicy,
    pub on_generation_failure: GenerationFailurePolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: crate::constants::DEFAULT_BATCH_SIZE,
            max_new_tokens: crate::constants::DEFAULT_MAX_NEW_TOKENS,
            uncertainty_method: UncertaintyMethod::default(),
            match_policy: MatchPolicy::Exact,
            on_generation_failure: GenerationFailurePolicy::default(),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            max_new_tokens: config.max_new_tokens,
            uncertainty_method: config.uncertainty_method,
            match_policy: config.dataset.match_policy(),
            on_generation_failure: config.on_generation_failure,
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches_processed: usize,
    pub batches_skipped: usize,
    pub rows_written: u64,
    /// Individual fields set to "unavailable".
    pub scoring_failures: u64,
    /// Last id already persisted before this run, when resuming.
    pub resumed_from: Option<u64>,
    /// A stop was requested and honoured at a batch boundary.
    pub cancelled: bool,
}

/// One sample's row plus every scoring step that failed for it.
#[derive(Debug)]
pub struct ScoredSample {
    pub row: ResultRow,
    pub failures: Vec<ScoringFailure>,
}

/// Drives generation, scoring and persistence batch by batch.
///
/// Single-threaded: the next batch is generated only after the current batch is
/// persisted and its outputs dropped.
pub struct Orchestrator<S: ResultSink> {
    generator: Arc<dyn Generator>,
    sink: S,
    settings: RunSettings,
    similarity: Option<SimilarityScorer>,
    manifest: Option<(RunManifest, PathBuf)>,
    stop: Arc<AtomicBool>,
    state: RunState,
}

impl<S: ResultSink> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.generator.model_id())
            .field("settings", &self.settings)
            .field("similarity", &self.similarity.as_ref().map(|s| s.method()))
            .field("state", &self.state)
            .finish()
    }
}

impl<S: ResultSink> Orchestrator<S> {
    /// Creates an orchestrator without similarity scoring or a manifest.
    pub fn new(
        generator: Arc<dyn Generator>,
        sink: S,
        settings: RunSettings,
    ) -> Result<Self, PipelineError> {
        if settings.batch_size == 0 {
            return Err(ConfigError::ZeroCount {
                name: Config::ENV_BATCH_SIZE,
            }
            .into());
        }
        if settings.max_new_tokens == 0 {
            return Err(ConfigError::ZeroCount {
                name: Config::ENV_MAX_NEW_TOKENS,
            }
            .into());
        }

        Ok(Self {
            generator,
            sink,
            settings,
            similarity: None,
            manifest: None,
            stop: Arc::new(AtomicBool::new(false)),
            state: RunState::Init,
        })
    }

    /// Enables similarity scoring.
    ///
    /// Attention similarity needs a backend that returns attention weights.
    pub fn with_similarity(mut self, scorer: SimilarityScorer) -> Result<Self, PipelineError> {
        ensure_similarity_supported(self.generator.as_ref(), &scorer)?;
        self.similarity = Some(scorer);
        Ok(self)
    }

    /// Rewrites `manifest` at `path` after every persisted batch.
    pub fn with_manifest(mut self, manifest: RunManifest, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some((manifest, path.into()));
        self
    }

    /// Shares a stop flag; setting it ends the run at the next batch boundary.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn manifest(&self) -> Option<&RunManifest> {
        self.manifest.as_ref().map(|(manifest, _)| manifest)
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
    }

    fn begin(&mut self) -> Result<(), PipelineError> {
        if self.state != RunState::Init {
            return Err(PipelineError::AlreadyRun);
        }
        self.transition(RunState::Loading);
        Ok(())
    }

    /// Loads `name` from `data_dir` and runs over it.
    pub fn run_dataset(
        &mut self,
        name: DatasetName,
        data_dir: &Path,
    ) -> Result<RunSummary, PipelineError> {
        self.begin()?;
        let samples = dataset::load_dataset(name, data_dir)?;
        self.process(&samples)
    }

    /// Runs over `samples` in load order.
    ///
    /// An orchestrator runs once; a second call fails with [`PipelineError::AlreadyRun`].
    pub fn run(&mut self, samples: &[Sample]) -> Result<RunSummary, PipelineError> {
        self.begin()?;
        self.process(samples)
    }

    fn process(&mut self, samples: &[Sample]) -> Result<RunSummary, PipelineError> {
        let batch_size = self.settings.batch_size;
        let total_batches = samples.len().div_ceil(batch_size);
        let resume_after = self.sink.resume_after();

        let options = GenerationOptions {
            return_logits: true,
            return_attentions: self
                .similarity
                .as_ref()
                .is_some_and(|s| s.method().requires_attentions()),
            max_new_tokens: self.settings.max_new_tokens,
        };

        let mut summary = RunSummary {
            resumed_from: resume_after,
            ..Default::default()
        };

        info!(
            model = self.generator.model_id(),
            samples = samples.len(),
            batch_size,
            total_batches,
            uncertainty = %self.settings.uncertainty_method,
            similarity = self
                .similarity
                .as_ref()
                .map(|s| s.method().as_str())
                .unwrap_or(SIMILARITY_DISABLED_TAG),
            resume_after = ?resume_after,
            "Starting run"
        );

        for (batch_index, batch) in samples.chunks(batch_size).enumerate() {
            // Acquire: pairs with the Release store of whoever requested the stop.
            if self.stop.load(Ordering::Acquire) {
                info!(batch_index, "Stop requested, ending run at batch boundary");
                summary.cancelled = true;
                break;
            }

            let first_id = (batch_index * batch_size) as u64;
            let skip = match resume_after {
                Some(last) if last >= first_id => {
                    ((last - first_id + 1) as usize).min(batch.len())
                }
                _ => 0,
            };
            if skip == batch.len() {
                debug!(batch_index, "Batch already persisted, skipping");
                continue;
            }

            let pending = &batch[skip..];
            let first_pending_id = first_id + skip as u64;

            self.transition(RunState::ProcessingBatch {
                index: batch_index,
                phase: BatchPhase::Generate,
            });
            let outputs = match self.generate(pending, &options) {
                Ok(outputs) => outputs,
                Err(source) => match self.settings.on_generation_failure {
                    GenerationFailurePolicy::Abort => {
                        return Err(PipelineError::Generation {
                            batch_index,
                            source,
                        });
                    }
                    GenerationFailurePolicy::Skip => {
                        warn!(batch_index, error = %source, "Generation failed, skipping batch");
                        summary.batches_skipped += 1;
                        self.update_manifest(batch_index, |manifest| {
                            manifest.record_skip(batch_index)
                        })?;
                        continue;
                    }
                },
            };

            self.transition(RunState::ProcessingBatch {
                index: batch_index,
                phase: BatchPhase::ScoreEachSample,
            });
            let rows: Vec<ResultRow> = pending
                .iter()
                .zip(&outputs)
                .enumerate()
                .map(|(offset, (sample, output))| {
                    let id = first_pending_id + offset as u64;
                    let scored = self.score_sample(id, sample, output);
                    for failure in &scored.failures {
                        warn!(
                            batch_index,
                            id = scored.row.id,
                            field = failure.field(),
                            error = %failure,
                            "Scoring failed, field marked unavailable"
                        );
                    }
                    summary.scoring_failures += scored.failures.len() as u64;
                    scored.row
                })
                .collect();

            self.transition(RunState::ProcessingBatch {
                index: batch_index,
                phase: BatchPhase::PersistBatch,
            });
            for row in &rows {
                self.sink
                    .append(row)
                    .map_err(|source| PipelineError::Persistence {
                        batch_index,
                        id: row.id,
                        source,
                    })?;
                summary.rows_written += 1;

                if summary.rows_written % PROGRESS_EVERY == 0 {
                    info!(
                        rows_written = summary.rows_written,
                        last_id = row.id,
                        "Progress"
                    );
                }
            }

            self.transition(RunState::ProcessingBatch {
                index: batch_index,
                phase: BatchPhase::ReleaseBatchMemory,
            });
            drop(rows);
            drop(outputs);

            let next_id = first_id + batch.len() as u64;
            self.update_manifest(batch_index, |manifest| {
                manifest.record_batch(batch_index, next_id)
            })?;

            summary.batches_processed += 1;
            debug!(batch_index, total_batches, "Batch complete");
        }

        self.transition(RunState::Done);
        info!(
            batches_processed = summary.batches_processed,
            batches_skipped = summary.batches_skipped,
            rows_written = summary.rows_written,
            scoring_failures = summary.scoring_failures,
            cancelled = summary.cancelled,
            "Run finished"
        );

        Ok(summary)
    }

    /// Applies `update` to the manifest, if any, and rewrites it on disk.
    fn update_manifest(
        &mut self,
        batch_index: usize,
        update: impl FnOnce(&mut RunManifest),
    ) -> Result<(), PipelineError> {
        let Some((manifest, path)) = self.manifest.as_mut() else {
            return Ok(());
        };
        update(manifest);
        manifest
            .write_atomic(path)
            .map_err(|source| PipelineError::Manifest {
                batch_index,
                source,
            })
    }

    fn generate(
        &self,
        batch: &[Sample],
        options: &GenerationOptions,
    ) -> Result<Vec<GenerationOutput>, GenerationError> {
        let outputs = self.generator.generate(batch, options)?;
        if outputs.len() != batch.len() {
            return Err(GenerationError::OutputCountMismatch {
                expected: batch.len(),
                actual: outputs.len(),
            });
        }
        Ok(outputs)
    }

    /// Scores one sample; failures blank their field instead of propagating.
    pub fn score_sample(
        &self,
        id: u64,
        sample: &Sample,
        output: &GenerationOutput,
    ) -> ScoredSample {
        let mut failures = Vec::new();

        let uncertainty = match likelihood::extract(output)
            .map_err(ScoringFailure::from)
            .and_then(|trace| {
                uncertainty::score(&trace, self.settings.uncertainty_method)
                    .map_err(ScoringFailure::from)
            }) {
            Ok(result) => Measurement::from_score(result.score),
            Err(failure) => {
                failures.push(failure);
                Measurement::Unavailable
            }
        };

        let correct = match correctness::evaluate(sample, output, self.settings.match_policy) {
            Ok(verdict) => Verdict::Correct(verdict),
            Err(e) => {
                failures.push(e.into());
                Verdict::Unavailable
            }
        };

        let similarity = match &self.similarity {
            None => Measurement::NotApplicable,
            Some(scorer) => match scorer.score(sample, output) {
                Ok(result) => Measurement::from_score(result.score),
                Err(e) => {
                    failures.push(e.into());
                    Measurement::Unavailable
                }
            },
        };

        ScoredSample {
            row: ResultRow {
                id,
                question: sample.question.clone(),
                generated_answer: output.generated_text.clone(),
                uncertainty,
                correct,
                similarity,
            },
            failures,
        }
    }
}

impl Orchestrator<CsvSink> {
    /// Wires a CSV-backed run from `config`: model via `registry`, embedder for
    /// `sbert`, destination and manifest beside each other in the output directory.
    pub fn from_config(config: &Config, registry: &ModelRegistry) -> Result<Self, PipelineError> {
        config.validate()?;

        let generator =
            registry
                .get_or_load(&config.model)
                .map_err(|source| PipelineError::ModelLoad {
                    model: config.model.clone(),
                    source,
                })?;

        let manifest_path = config.manifest_path();
        let manifest = match config.destination_mode {
            DestinationMode::Resume => match RunManifest::load(&manifest_path)
                .map_err(PipelineError::ManifestRead)?
            {
                Some(existing) if existing.fingerprint != config.fingerprint() => {
                    return Err(ConfigError::ManifestMismatch {
                        path: manifest_path,
                    }
                    .into());
                }
                Some(existing) => {
                    info!(run_id = %existing.run_id, next_id = existing.next_id, "Resuming run");
                    existing
                }
                None => new_manifest(config),
            },
            _ => new_manifest(config),
        };

        let similarity = match config.similarity_method {
            None => None,
            Some(SimilarityMethod::Attention) => Some(SimilarityScorer::attention()),
            Some(SimilarityMethod::Sbert) => {
                Some(SimilarityScorer::sbert(Arc::new(load_embedder(config)?)))
            }
        };
        if let Some(scorer) = &similarity {
            ensure_similarity_supported(generator.as_ref(), scorer)?;
        }

        // Opened after model, embedder and similarity setup; overwrite truncates on the first row.
        let sink = CsvSink::open(config.destination_path(), config.destination_mode)?;

        let mut orchestrator = Self::new(generator, sink, RunSettings::from_config(config))?
            .with_manifest(manifest, manifest_path);
        if let Some(scorer) = similarity {
            orchestrator = orchestrator.with_similarity(scorer)?;
        }

        Ok(orchestrator)
    }
}

fn ensure_similarity_supported(
    generator: &dyn Generator,
    scorer: &SimilarityScorer,
) -> Result<(), ConfigError> {
    if scorer.method().requires_attentions() && !generator.supports_attentions() {
        return Err(ConfigError::AttentionUnsupported {
            model: generator.model_id().to_string(),
        });
    }
    Ok(())
}

fn new_manifest(config: &Config) -> RunManifest {
    RunManifest::new(
        config.fingerprint(),
        config.dataset.as_str(),
        config.model.as_str(),
        config.batch_size,
    )
}

fn load_embedder(config: &Config) -> Result<SentenceEmbedder, PipelineError> {
    let embedder_config = match config.embedder_path {
        Some(ref dir) => EmbedderConfig::new(dir),
        None => EmbedderConfig::stub(),
    };
    Ok(SentenceEmbedder::load(embedder_config)?)
}
