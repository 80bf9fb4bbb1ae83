//! Lichen presence trainer CLI
//!
//! Randomized hyperparameter search over a labelled CSV, held-out
//! evaluation and model persistence.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lichen_trainer::{train_model_from_csv, ModelFamily, PipelineConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lichen-train")]
#[command(author = "Lichen Mapping Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a lichen presence classifier with randomized search", long_about = None)]
struct Args {
    /// Labelled input CSV
    input: PathBuf,

    /// Output path for the model blob (a .blake3 digest is written next to it)
    model: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model family to search (boosted or forest); overrides the config file
    #[arg(long)]
    family: Option<ModelFamily>,

    /// Write the canonical JSON training report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Lichen presence trainer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = PipelineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(family) = args.family {
        config.search.family = family;
    }

    info!("Training configuration:");
    info!("  Family: {}", config.search.family);
    info!("  Test size: {} (seed {})", config.split.test_size, config.split.seed);
    info!(
        "  Search: n_iter={} cv={} n_jobs={}",
        config.search.n_iter, config.search.cv, config.search.n_jobs
    );

    let (outcome, digest) =
        train_model_from_csv(&args.input, &args.model, config).context("Training failed")?;

    info!("Best parameters: {:?}", outcome.report.best_params);
    info!("Accuracy: {:.4}", outcome.report.holdout_accuracy);
    info!("Classification Report:\n{}", outcome.report.classification_report);

    if let Some(report_path) = &args.report {
        let json = outcome.report.to_json().context("Failed to serialize training report")?;
        std::fs::write(report_path, json).context("Failed to write training report")?;
        let report_digest = outcome.report.digest_hex().context("Failed to hash training report")?;
        info!("Training report saved to {} (blake3 {})", report_path.display(), report_digest);
    }

    info!("Best model saved to {} (blake3 {})", args.model.display(), digest);
    Ok(())
}
