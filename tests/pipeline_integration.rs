//! Integration tests for the batch pipeline.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use common::fixtures::{EMPTY_MARKER, MISMATCH_MARKER, ScriptedGenerator, samples};
use sieve::config::{Config, ConfigError};
use sieve::dataset::{DatasetName, Sample};
use sieve::generation::ModelRegistry;
use sieve::pipeline::{
    GenerationFailurePolicy, Measurement, Orchestrator, PipelineError, RunManifest, RunSettings,
    Verdict,
};
use sieve::similarity::SimilarityScorer;
use sieve::sink::{CsvSink, DestinationMode, MemorySink, ResultSink};
use tempfile::TempDir;

fn settings(batch_size: usize) -> RunSettings {
    RunSettings {
        batch_size,
        ..Default::default()
    }
}

fn skip_settings(batch_size: usize) -> RunSettings {
    RunSettings {
        on_generation_failure: GenerationFailurePolicy::Skip,
        ..settings(batch_size)
    }
}

fn run_with(
    generator: Arc<ScriptedGenerator>,
    sink: MemorySink,
    settings: RunSettings,
    data: &[Sample],
) -> (Result<sieve::RunSummary, PipelineError>, MemorySink) {
    let mut orchestrator = Orchestrator::new(generator, sink, settings).unwrap();
    let result = orchestrator.run(data);
    (result, orchestrator.into_sink())
}

fn csv_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_five_samples_batch_two() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(
        Arc::clone(&generator),
        MemorySink::new(),
        settings(2),
        &samples(5),
    );

    let summary = result.unwrap();
    assert_eq!(generator.batch_sizes(), vec![2, 2, 1]);
    assert_eq!(sink.ids(), vec![0, 1, 2, 3, 4]);
    assert_eq!(summary.batches_processed, 3);
    assert_eq!(summary.rows_written, 5);
    assert_eq!(summary.scoring_failures, 0);
}

#[test]
fn test_rows_carry_scores() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(generator, MemorySink::new(), settings(2), &samples(3));
    result.unwrap();

    for row in sink.rows() {
        assert_eq!(row.generated_answer, "scripted answer");
        assert_eq!(row.correct, Verdict::Correct(true));
        let Measurement::Value(uncertainty) = row.uncertainty else {
            panic!("expected a numeric uncertainty, got {:?}", row.uncertainty);
        };
        assert!(uncertainty.is_finite() && uncertainty >= 0.0);
    }
}

#[test]
fn test_empty_generation_is_undefined_and_run_continues() {
    let mut data = samples(3);
    data[1] = Sample::new(format!("Question 1? {EMPTY_MARKER}"), "scripted answer");

    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(generator, MemorySink::new(), settings(2), &data);
    let summary = result.unwrap();

    assert_eq!(sink.ids(), vec![0, 1, 2]);
    let row = &sink.rows()[1];
    assert_eq!(row.uncertainty, Measurement::Undefined);
    assert_eq!(row.correct, Verdict::Correct(false));
    assert_eq!(summary.scoring_failures, 0);
    assert!(matches!(sink.rows()[2].uncertainty, Measurement::Value(_)));
}

#[test]
fn test_similarity_absent_is_not_applicable() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(generator, MemorySink::new(), settings(4), &samples(6));
    result.unwrap();

    assert!(
        sink.rows()
            .iter()
            .all(|row| row.similarity == Measurement::NotApplicable)
    );
}

#[test]
fn test_scoring_failure_keeps_ids_contiguous() {
    let mut data = samples(4);
    data[2] = Sample::new(format!("Question 2? {MISMATCH_MARKER}"), "scripted answer");

    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(generator, MemorySink::new(), settings(3), &data);
    let summary = result.unwrap();

    assert_eq!(sink.ids(), vec![0, 1, 2, 3]);
    assert_eq!(sink.rows()[2].uncertainty, Measurement::Unavailable);
    assert_eq!(sink.rows()[2].correct, Verdict::Correct(true));
    assert_eq!(summary.scoring_failures, 1);
}

#[test]
fn test_attention_similarity_with_near_zero_weights() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut orchestrator = Orchestrator::new(generator, MemorySink::new(), settings(2))
        .unwrap()
        .with_similarity(SimilarityScorer::attention())
        .unwrap();
    orchestrator.run(&samples(3)).unwrap();

    for row in orchestrator.sink().rows() {
        let Measurement::Value(score) = row.similarity else {
            panic!("expected a similarity score, got {:?}", row.similarity);
        };
        assert!(score.is_finite());
        assert!(score > 0.0 && score <= 1.0);
    }
}

#[test]
fn test_attention_requires_backend_support() {
    let generator = Arc::new(ScriptedGenerator::new().without_attentions());
    let err = Orchestrator::new(generator, MemorySink::new(), settings(2))
        .unwrap()
        .with_similarity(SimilarityScorer::attention())
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::AttentionUnsupported { .. })
    ));
}

#[test]
fn test_generation_outputs_released_between_batches() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, _sink) = run_with(
        Arc::clone(&generator),
        MemorySink::new(),
        settings(3),
        &samples(10),
    );
    result.unwrap();

    assert!(generator.live_at_call().iter().all(|&live| live == 0));
    assert!(generator.tracker().peak() <= 3);
    assert_eq!(generator.tracker().total(), 10);
    assert_eq!(generator.tracker().live(), 0);
}

#[test]
fn test_persistence_failure_is_fatal_with_batch_index() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(
        generator,
        MemorySink::failing_after(3),
        settings(2),
        &samples(6),
    );

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Persistence {
            batch_index: 1,
            id: 3,
            ..
        }
    ));
    assert!(err.to_string().contains("batch 1"));
    assert_eq!(sink.ids(), vec![0, 1, 2]);
}

#[test]
fn test_generation_failure_aborts_by_default() {
    let generator = Arc::new(ScriptedGenerator::new().failing_on(&[1]));
    let (result, sink) = run_with(
        Arc::clone(&generator),
        MemorySink::new(),
        settings(2),
        &samples(6),
    );

    let err = result.unwrap_err();
    assert!(matches!(err, PipelineError::Generation { batch_index: 1, .. }));
    assert_eq!(sink.ids(), vec![0, 1]);
    assert_eq!(generator.calls(), 2);
}

#[test]
fn test_generation_failure_skip_policy() {
    let generator = Arc::new(ScriptedGenerator::new().failing_on(&[1]));
    let (result, sink) = run_with(generator, MemorySink::new(), skip_settings(2), &samples(6));

    let summary = result.unwrap();
    assert_eq!(sink.ids(), vec![0, 1, 4, 5]);
    assert_eq!(summary.batches_skipped, 1);
    assert_eq!(summary.batches_processed, 2);
}

#[test]
fn test_output_count_mismatch_is_generation_failure() {
    let generator = Arc::new(ScriptedGenerator::new().short_on(&[0]));
    let (result, sink) = run_with(generator, MemorySink::new(), settings(2), &samples(4));

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::Generation { batch_index: 0, .. }
    ));
    assert!(sink.rows().is_empty());
}

#[test]
fn test_stop_takes_effect_at_batch_boundary() {
    let stop = Arc::new(AtomicBool::new(false));
    let generator = Arc::new(ScriptedGenerator::new().stopping_after(1, Arc::clone(&stop)));

    let mut orchestrator = Orchestrator::new(Arc::<ScriptedGenerator>::clone(&generator), MemorySink::new(), settings(2))
        .unwrap()
        .with_stop_flag(stop);
    let summary = orchestrator.run(&samples(8)).unwrap();

    // The batch in flight when the stop arrived is still completed.
    assert!(summary.cancelled);
    assert_eq!(orchestrator.sink().ids(), vec![0, 1, 2, 3]);
    assert_eq!(generator.calls(), 2);
}

#[test]
fn test_memory_sink_resume_skips_persisted_ids() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (result, sink) = run_with(
        Arc::clone(&generator),
        MemorySink::resuming_after(2),
        settings(2),
        &samples(5),
    );

    let summary = result.unwrap();
    assert_eq!(summary.resumed_from, Some(2));
    assert_eq!(sink.ids(), vec![3, 4]);
    // Batch 0 is skipped outright; batch 1 regenerates only its unpersisted sample.
    assert_eq!(generator.batch_sizes(), vec![1, 1]);
}

#[test]
fn test_csv_destination_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");

    let generator = Arc::new(ScriptedGenerator::new());
    let sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
    let mut orchestrator = Orchestrator::new(generator, sink, settings(2)).unwrap();
    orchestrator.run(&samples(3)).unwrap();

    let lines = csv_lines(&path);
    assert_eq!(
        lines[0],
        "id,question,generated_answer,uncertainty,correct,similarity_score"
    );
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("0,Question 0?,scripted answer,"));
    assert!(lines[1].ends_with(",true,NA"));
    assert_eq!(orchestrator.sink().rows_written(), 3);
}

#[test]
fn test_csv_resume_after_interrupted_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");
    let data = samples(5);

    {
        let stop = Arc::new(AtomicBool::new(false));
        let generator = Arc::new(ScriptedGenerator::new().stopping_after(0, Arc::clone(&stop)));
        let sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
        let mut first = Orchestrator::new(generator, sink, settings(2))
            .unwrap()
            .with_stop_flag(stop);
        assert!(first.run(&data).unwrap().cancelled);
    }

    let generator = Arc::new(ScriptedGenerator::new());
    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    let mut second = Orchestrator::new(Arc::<ScriptedGenerator>::clone(&generator), sink, settings(2)).unwrap();
    let summary = second.run(&data).unwrap();

    assert_eq!(summary.resumed_from, Some(1));
    assert_eq!(generator.batch_sizes(), vec![2, 1]);

    let lines = csv_lines(&path);
    assert_eq!(lines.len(), 6);
    let ids: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
}

#[test]
fn test_resume_refuses_foreign_manifest() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        output_dir: dir.path().to_path_buf(),
        destination_mode: DestinationMode::Resume,
        ..Default::default()
    };

    RunManifest::new("some-other-fingerprint", "sampleqa", "stub", 32)
        .write_atomic(&config.manifest_path())
        .unwrap();

    let err = Orchestrator::from_config(&config, &ModelRegistry::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::ManifestMismatch { .. })
    ));
}

#[test]
fn test_resume_accepts_own_manifest() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        output_dir: dir.path().to_path_buf(),
        destination_mode: DestinationMode::Resume,
        batch_size: 3,
        ..Default::default()
    };
    let registry = ModelRegistry::default();
    let data = sieve::dataset::sample_qa();

    let mut first = Orchestrator::from_config(&config, &registry).unwrap();
    first.run(&data[..3]).unwrap();
    let run_id = first.manifest().unwrap().run_id.clone();

    let mut second = Orchestrator::from_config(&config, &registry).unwrap();
    assert_eq!(second.manifest().unwrap().run_id, run_id);
    let summary = second.run(&data).unwrap();

    assert_eq!(summary.resumed_from, Some(2));
    assert_eq!(summary.rows_written, data.len() as u64 - 3);
    let manifest = RunManifest::load(&config.manifest_path()).unwrap().unwrap();
    assert_eq!(manifest.next_id, data.len() as u64);
}

#[test]
fn test_error_if_exists_refuses_existing_destination() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        output_dir: dir.path().to_path_buf(),
        destination_mode: DestinationMode::ErrorIfExists,
        ..Default::default()
    };
    std::fs::write(config.destination_path(), "").unwrap();

    let err = Orchestrator::from_config(&config, &ModelRegistry::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Destination(_)));
}

#[test]
fn test_csv_resume_after_torn_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");
    std::fs::write(
        &path,
        "id,question,generated_answer,uncertainty,correct,similarity_score\n\
         0,q,a,1.0,true,NA\n\
         1,What is",
    )
    .unwrap();

    let generator = Arc::new(ScriptedGenerator::new());
    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    let mut orchestrator = Orchestrator::new(Arc::<ScriptedGenerator>::clone(&generator), sink, settings(2)).unwrap();
    let summary = orchestrator.run(&samples(4)).unwrap();

    assert_eq!(summary.resumed_from, Some(0));
    assert_eq!(summary.rows_written, 3);
    assert_eq!(generator.batch_sizes(), vec![1, 2]);

    let lines = csv_lines(&path);
    assert_eq!(lines.len(), 5);
    assert!(lines[2].starts_with("1,Question 1?,scripted answer,"));
    let ids: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(ids, vec!["0", "1", "2", "3"]);
}

#[test]
fn test_failed_setup_keeps_overwrite_destination() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        output_dir: dir.path().to_path_buf(),
        dataset: DatasetName::SciQ,
        data_dir: dir.path().join("missing"),
        destination_mode: DestinationMode::Overwrite,
        ..Default::default()
    };
    std::fs::write(config.destination_path(), "previous results\n").unwrap();

    let mut orchestrator = Orchestrator::from_config(&config, &ModelRegistry::default()).unwrap();
    let err = orchestrator
        .run_dataset(config.dataset, &config.data_dir)
        .unwrap_err();

    assert!(matches!(err, PipelineError::Dataset(_)));
    assert_eq!(
        std::fs::read_to_string(config.destination_path()).unwrap(),
        "previous results\n"
    );
}

#[test]
fn test_trailing_skipped_batch_is_recorded_and_retried_on_resume() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");
    let manifest_path = dir.path().join("results_sampleqa.manifest.json");
    let data = samples(6);

    {
        let generator = Arc::new(ScriptedGenerator::new().failing_on(&[2]));
        let sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
        let mut first = Orchestrator::new(generator, sink, skip_settings(2))
            .unwrap()
            .with_manifest(
                RunManifest::new("fingerprint", "sampleqa", "scripted", 2),
                manifest_path.clone(),
            );
        assert_eq!(first.run(&data).unwrap().batches_skipped, 1);
    }

    let manifest = RunManifest::load(&manifest_path).unwrap().unwrap();
    assert_eq!(manifest.skipped_batches, vec![2]);
    assert_eq!(manifest.next_id, 4);
    assert_eq!(manifest.completed_batches, 2);

    let generator = Arc::new(ScriptedGenerator::new());
    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    let mut second = Orchestrator::new(Arc::<ScriptedGenerator>::clone(&generator), sink, skip_settings(2))
        .unwrap()
        .with_manifest(manifest, manifest_path.clone());
    let summary = second.run(&data).unwrap();

    assert_eq!(summary.resumed_from, Some(3));
    assert_eq!(summary.rows_written, 2);
    assert_eq!(generator.batch_sizes(), vec![2]);

    let manifest = RunManifest::load(&manifest_path).unwrap().unwrap();
    assert!(manifest.skipped_batches.is_empty());
    assert_eq!(manifest.next_id, 6);
}

#[test]
fn test_interior_skipped_batch_is_not_retried_on_resume() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");
    let manifest_path = dir.path().join("results_sampleqa.manifest.json");
    let data = samples(6);

    {
        let generator = Arc::new(ScriptedGenerator::new().failing_on(&[1]));
        let sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
        let mut first = Orchestrator::new(generator, sink, skip_settings(2))
            .unwrap()
            .with_manifest(
                RunManifest::new("fingerprint", "sampleqa", "scripted", 2),
                manifest_path.clone(),
            );
        first.run(&data).unwrap();
    }

    let manifest = RunManifest::load(&manifest_path).unwrap().unwrap();
    assert_eq!(manifest.skipped_batches, vec![1]);

    let generator = Arc::new(ScriptedGenerator::new());
    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    let mut second = Orchestrator::new(Arc::<ScriptedGenerator>::clone(&generator), sink, skip_settings(2))
        .unwrap()
        .with_manifest(manifest, manifest_path.clone());
    let summary = second.run(&data).unwrap();

    // Ids 2 and 3 stay a gap: resume continues after the highest persisted id.
    assert_eq!(summary.resumed_from, Some(5));
    assert_eq!(summary.rows_written, 0);
    assert_eq!(generator.calls(), 0);

    let ids: Vec<String> = csv_lines(&path)[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["0", "1", "4", "5"]);
    assert_eq!(
        RunManifest::load(&manifest_path).unwrap().unwrap().skipped_batches,
        vec![1]
    );
}
