//! landrec CLI - digitize scanned land-record documents

use anyhow::{Context as _, Result};
use clap::Parser;
use landrec_common::FieldKind;
use landrec_extraction::FieldExtractor;
use landrec_ocr::remote::RemoteEngineFactory;
use landrec_ocr::{EngineFactory, OcrDispatchPool};
use landrec_orchestrator::{
    commit_records, load_config, BackendKind, BatchOptions, BatchOrchestrator, BatchReport,
    JobState, JsonDirSink, PipelineConfig,
};
use landrec_preprocess::ImagePreprocessor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "landrec",
    version,
    about = "Digitize scanned land-record documents",
    after_help = "EXAMPLES:\n  \
                  landrec scans/*.png\n  \
                  landrec --detect-table --output report.json deed.pdf\n  \
                  landrec --remote http://127.0.0.1:8866 --handwritten --batch-size 8 scans/*.jpg"
)]
struct Cli {
    /// Files to process (PDF, JPEG, PNG or TIFF)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Pipeline configuration file
    #[arg(short, long, default_value = "landrec.toml")]
    config: PathBuf,

    /// Recognize pages as handwritten blocks
    #[arg(long)]
    handwritten: bool,

    /// Faster, less thorough preprocessing
    #[arg(long)]
    fast: bool,

    /// Files preprocessed together
    #[arg(long)]
    batch_size: Option<usize>,

    /// Recognition workers
    #[arg(long)]
    pool_size: Option<usize>,

    /// Detect table cells and recognize each one
    #[arg(long)]
    detect_table: bool,

    /// Use the recognition service at this URL
    #[arg(long, value_name = "URL")]
    remote: Option<String>,

    /// Write the batch report as JSON
    #[arg(short, long, value_name = "JSON")]
    output: Option<PathBuf>,

    /// Save one JSON record per completed file into this directory
    #[arg(long, value_name = "DIR")]
    records: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command-line flags take precedence over the file
    fn apply_to(&self, config: &mut PipelineConfig) {
        let batch = config.batch.get_or_insert_with(Default::default);
        if self.handwritten {
            batch.handwritten = Some(true);
        }
        if self.fast {
            batch.fast_mode = Some(true);
        }
        if let Some(size) = self.batch_size {
            batch.size = Some(size);
        }
        if let Some(size) = self.pool_size {
            config.pool.get_or_insert_with(Default::default).size = Some(size);
        }
        if self.detect_table {
            config
                .preprocess
                .get_or_insert_with(Default::default)
                .detect_table = true;
        }
        if let Some(url) = &self.remote {
            let backend = config.backend.get_or_insert_with(Default::default);
            backend.kind = Some(BackendKind::Remote);
            backend.endpoint = Some(url.clone());
        }
    }
}

fn engine_factory(config: &PipelineConfig) -> Result<Box<dyn EngineFactory>> {
    match config.backend_kind() {
        BackendKind::Remote => Ok(Box::new(RemoteEngineFactory::new(config.remote_config()))),
        BackendKind::Tesseract => tesseract_factory(config),
    }
}

#[cfg(feature = "tesseract")]
fn tesseract_factory(config: &PipelineConfig) -> Result<Box<dyn EngineFactory>> {
    use landrec_ocr::tesseract::{TesseractConfig, TesseractEngineFactory};
    Ok(Box::new(TesseractEngineFactory::new(TesseractConfig {
        language: config.language(),
        ..TesseractConfig::default()
    })))
}

#[cfg(not(feature = "tesseract"))]
fn tesseract_factory(_config: &PipelineConfig) -> Result<Box<dyn EngineFactory>> {
    anyhow::bail!(
        "Local recognition requires the `tesseract` feature; \
         rebuild with --features tesseract or pass --remote <URL>"
    )
}

fn print_report(report: &BatchReport) {
    for rejection in &report.rejected {
        println!("REJECTED {}: {}", rejection.file, rejection.reason);
    }
    for job in &report.jobs {
        match job.state() {
            JobState::Done { data } => {
                println!("DONE     {}: {}", job.file, data.summary);
                if let Some(date) = data.fields.get(FieldKind::Date) {
                    println!("         date {date}");
                }
                if let Some(location) = data.fields.get(FieldKind::Location) {
                    println!("         location {location}");
                }
            }
            JobState::Failed { cause, .. } => println!("FAILED   {}: {}", job.file, cause),
            other => println!("{:<8} {}", other.name().to_uppercase(), job.file),
        }
    }
    println!(
        "\n{} done, {} failed, {} skipped, {} rejected in {:.1}s ({:.2} files/sec)",
        report.done(),
        report.failed(),
        report.skipped(),
        report.rejected.len(),
        report.elapsed_secs,
        report.files_per_sec
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = load_config(&cli.config)?;
    cli.apply_to(&mut config);
    config.validate()?;

    let factory = engine_factory(&config)?;
    let pool = OcrDispatchPool::start(factory.as_ref(), config.pool_size())
        .await
        .context("Failed to start recognition pool")?;
    info!("Recognition pool ready with {} workers", pool.size());

    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(ImagePreprocessor::default()),
        pool.clone(),
        FieldExtractor::default(),
        BatchOptions::from_config(&config),
    );

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, skipping remaining files");
            stop.stop();
        }
    });

    let result = orchestrator.process_paths(&cli.files).await;
    pool.shutdown().await;
    let report = result.context("Batch aborted")?;

    print_report(&report);

    if let Some(dir) = &cli.records {
        let sink = JsonDirSink::new(dir);
        let outcomes = commit_records(&sink, &report.jobs).await;
        let failures = outcomes.iter().filter(|o| o.error.is_some()).count();
        println!(
            "Saved {} records to {} ({} failed)",
            outcomes.len() - failures,
            dir.display(),
            failures
        );
    }

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
