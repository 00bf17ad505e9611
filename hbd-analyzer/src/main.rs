//! hbd-analyzer - command-line entry point
//!
//! Analyzes exported chat transcripts and prints the birthdays it can
//! support with enough evidence.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use hbd_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use hbd_common::events::EventBus;
use hbd_common::AnalysisConfig;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

use hbd_analyzer::{export, BirthdayPipeline, InMemoryStore};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Table,
}

/// Command-line arguments for hbd-analyzer
#[derive(Parser, Debug)]
#[command(name = "hbd-analyzer")]
#[command(about = "Extract birthdays from exported chat transcripts")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", env = "HBD_FORMAT")]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Override the minimum confidence threshold (0.0 - 1.0)
    #[arg(long, value_name = "SCORE")]
    min_confidence: Option<f64>,

    /// Show the confidence breakdown for each identity (table format)
    #[arg(long)]
    explain: bool,

    /// Transcript files to analyze
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise start at info and switch to logging.level
    // once the config is loaded
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config = AnalysisConfig::load_or_default(config_path.as_deref());
    if !filter_from_env {
        filter_handle
            .reload(tracing_subscriber::EnvFilter::new(&config.logging.level))
            .context("Failed to apply logging.level")?;
    }

    if let Some(threshold) = args.min_confidence {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("--min-confidence must be between 0.0 and 1.0, got {}", threshold);
        }
        config.confidence.min_threshold = threshold;
    }

    info!("Starting hbd-analyzer {}", env!("CARGO_PKG_VERSION"));
    info!("Analyzing {} transcript(s)", args.files.len());

    let pipeline = Arc::new(BirthdayPipeline::new(config));
    let store = InMemoryStore::new();
    let events = EventBus::default();

    // Progress listener
    let mut rx = events.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    debug!(event = event.event_type(), run_id = %event.run_id(), "{:?}", event)
                }
                Err(RecvError::Lagged(skipped)) => warn!("Progress listener skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = pipeline.run_batch(&args.files, &store, &events).await;
    drop(events);
    let _ = listener.await;

    let rendered = match args.format {
        OutputFormat::Json => export::to_json(&report).context("Failed to serialize report")?,
        OutputFormat::Csv => export::to_csv(&report.identities),
        OutputFormat::Table => export::to_table(&report, args.explain),
    };

    match &args.output {
        Some(path) => {
            export::write_to(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} identities to {}", report.identities.len(), path.display());
        }
        None => print!("{}", rendered),
    }

    if report.files_failed() == report.files.len() {
        bail!("No transcript could be analyzed");
    }

    Ok(())
}
