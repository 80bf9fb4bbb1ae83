//! Lichen presence trainer
//!
//! Deterministic training, prediction and classifier sweeps on top of
//! `lichen-core`. A single seed reproduces the train/test split, the
//! hyperparameter draws and every tree.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod forest;
pub mod predictor;
pub mod search;
pub mod sweep;
pub mod trainer;
pub mod training;

use std::path::Path;

use lichen_core::ClassifierModel;

pub use config::{ColumnsConfig, PipelineConfig};
pub use dataset::{stratified_folds, stratified_split, Dataset};
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use forest::{ForestConfig, ForestTrainer, MaxFeatures, RowSampling};
pub use predictor::{Prediction, PredictionTable, Predictor};
pub use search::{BoostedSpace, ForestSpace, RandomizedSearch, SearchOutcome, SearchSpace};
pub use sweep::{CsvFeatureSource, FeatureSource, Sweep, SweepConfig, SweepOutcome};
pub use trainer::{GbdtConfig, GbdtTrainer};
pub use training::{ModelFamily, TrainingOutcome, TrainingPipeline, TrainingReport};

/// Train from a CSV file with the given configuration and persist the model
/// with its digest sidecar, returning the outcome and the digest.
pub fn train_model_from_csv(
    input: &Path,
    model_path: &Path,
    config: PipelineConfig,
) -> Result<(TrainingOutcome, String)> {
    let outcome = TrainingPipeline::new(config).run(input)?;
    let digest = outcome.model.save_with_digest(model_path)?;
    Ok((outcome, digest))
}

/// Load a persisted model and predict a CSV file
pub fn predict_csv_with_model(
    model_path: &Path,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<PredictionTable> {
    let model = ClassifierModel::load(model_path)?;
    Predictor::new(model, config.columns.clone(), config.predict.align_mode).predict_csv(input, output)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
