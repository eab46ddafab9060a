//! `sieve` entrypoint: score a QA dataset and stream results to CSV.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use mimalloc::MiMalloc;
use tokio::signal;

use sieve::config::{Config, Overrides};
use sieve::generation::ModelRegistry;
use sieve::pipeline::Orchestrator;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Uncertainty, similarity and correctness scoring for LLM answers to QA datasets.
///
/// Every flag falls back to its `SIEVE_*` environment variable, then to the default.
#[derive(Debug, Parser)]
#[command(name = "sieve", version)]
struct Cli {
    /// `stub`, or a Qwen2 GGUF file with tokenizer.json beside it
    #[arg(long)]
    model: Option<String>,

    /// sciq, coqa, triviaqa or sampleqa
    #[arg(long)]
    dataset: Option<String>,

    /// Directory holding {dataset}.jsonl
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory receiving results_{dataset}.csv
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// mnll, perplexity, entropy or lastde
    #[arg(long)]
    uncertainty_method: Option<String>,

    /// none, attention or sbert
    #[arg(long)]
    similarity_method: Option<String>,

    /// Sentence-transformers model directory for sbert (stub embedder when unset)
    #[arg(long)]
    embedder_path: Option<PathBuf>,

    #[arg(long)]
    max_new_tokens: Option<usize>,

    /// append, overwrite, error-if-exists or resume
    #[arg(long)]
    destination_mode: Option<String>,

    /// abort or skip
    #[arg(long)]
    on_generation_failure: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            dataset: self.dataset.clone(),
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
            batch_size: self.batch_size,
            uncertainty_method: self.uncertainty_method.clone(),
            similarity_method: self.similarity_method.clone(),
            embedder_path: self.embedder_path.clone(),
            max_new_tokens: self.max_new_tokens,
            destination_mode: self.destination_mode.clone(),
            on_generation_failure: self.on_generation_failure.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?.with_overrides(&cli.overrides())?;
    config.validate()?;

    tracing::info!(
        model = %config.model,
        dataset = %config.dataset,
        batch_size = config.batch_size,
        uncertainty = %config.uncertainty_method,
        destination = %config.destination_path().display(),
        "Sieve starting"
    );

    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn(stop_on_signal(Arc::clone(&stop)));

    let summary = tokio::task::spawn_blocking(move || {
        let registry = ModelRegistry::default();
        let mut orchestrator =
            Orchestrator::from_config(&config, &registry)?.with_stop_flag(stop);
        orchestrator.run_dataset(config.dataset, &config.data_dir)
    })
    .await??;

    tracing::info!(
        rows_written = summary.rows_written,
        batches_processed = summary.batches_processed,
        batches_skipped = summary.batches_skipped,
        scoring_failures = summary.scoring_failures,
        cancelled = summary.cancelled,
        "Sieve finished"
    );
    Ok(())
}

async fn stop_on_signal(stop: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping after the current batch");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current batch");
        }
    }

    // Release: pairs with the orchestrator's Acquire load at each batch boundary.
    stop.store(true, Ordering::Release);
}
