//! Lichen presence classifier sweep CLI
//!
//! Samples combinations from several classifier families, ranks them on a
//! held-out partition and evaluates a thresholded probability ensemble of the
//! best ones.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lichen_core::serde_canon::to_canonical_json_pretty;
use lichen_trainer::sweep::{CsvFeatureSource, Sweep};
use lichen_trainer::PipelineConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lichen-sweep")]
#[command(author = "Lichen Mapping Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sweep classifier families and build a probability ensemble", long_about = None)]
struct Args {
    /// Sampled feature table (id, bands, label, optional date and coordinates)
    samples: PathBuf,

    /// Output CSV of per-record ensemble probabilities
    output: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Year whose records are sampled
    #[arg(long)]
    year: Option<i32>,

    /// Region name recorded for the run
    #[arg(long)]
    region: Option<String>,

    /// Write the ranked results and ensemble evaluation as JSON
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

    let config = PipelineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    let mut sweep_config = config.sweep;
    if let Some(year) = args.year {
        sweep_config.year = year;
    }
    if let Some(region) = args.region {
        sweep_config.region = region;
    }

    let source = CsvFeatureSource::new(&args.samples, sweep_config.columns.clone());
    let outcome = Sweep::new(sweep_config).run_source(&source).context("Sweep failed")?;

    for (rank, result) in outcome.ranked.iter().take(10).enumerate() {
        info!("#{} {:.3} {} {:?}", rank + 1, result.accuracy, result.family, result.params);
    }
    info!("{} combinations skipped after errors", outcome.skipped.len());

    info!("Ensemble Accuracy: {:.4}", outcome.ensemble.accuracy);
    info!("Ensemble Kappa: {:.4}", outcome.ensemble.kappa);
    info!("Negative Class Accuracy: {:.4}", outcome.ensemble.producers_accuracy[0]);
    info!("Positive Class Accuracy: {:.4}", outcome.ensemble.producers_accuracy[1]);

    outcome
        .write_predictions(&args.output)
        .context("Failed to write ensemble predictions")?;
    info!("Ensemble predictions saved to {}", args.output.display());

    if let Some(report_path) = &args.report {
        let json = to_canonical_json_pretty(&outcome).context("Failed to serialize sweep report")?;
        std::fs::write(report_path, json).context("Failed to write sweep report")?;
        info!("Sweep report saved to {}", report_path.display());
    }

    Ok(())
}
