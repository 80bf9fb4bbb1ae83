//! Lichen presence prediction CLI
//!
//! Applies a persisted model to a raw CSV and writes one prediction row per
//! input row.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lichen_core::AlignMode;
use lichen_trainer::{predict_csv_with_model, PipelineConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lichen-predict")]
#[command(author = "Lichen Mapping Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predict lichen presence with a saved classifier", long_about = None)]
struct Args {
    /// Input CSV
    input: PathBuf,

    /// Output CSV (predictedClass, positiveClassProbability)
    output: PathBuf,

    /// Model blob written by lichen-train
    model: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail instead of zero-filling when the input's columns differ from the model's
    #[arg(long)]
    strict: bool,

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

    let mut config = PipelineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if args.strict {
        config.predict.align_mode = AlignMode::Strict;
    }

    let table = predict_csv_with_model(&args.model, &args.input, &args.output, &config)
        .context("Prediction failed")?;

    if !table.alignment.is_exact() {
        warn!(
            "Input schema differed from the model: {} columns zero-filled, {} dropped",
            table.alignment.zero_filled.len(),
            table.alignment.dropped.len()
        );
    }
    info!("{} rows predicted, {} left empty", table.predicted(), table.dropped());
    info!("Predictions saved to {}", args.output.display());
    Ok(())
}
