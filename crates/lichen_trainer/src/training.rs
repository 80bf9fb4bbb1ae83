//! End-to-end training pipeline
//!
//! Load and clean the labelled table, split it stratified, encode the
//! training split, align the held-out split onto the training columns,
//! weight the positive class, search hyperparameters with cross-validation
//! and evaluate the refit model on the held-out split.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use lichen_core::serde_canon::{hash_canonical_hex, to_canonical_json_pretty};
use lichen_core::{
    accuracy, imbalance_weight, AlignMode, ClassificationReport, ClassifierModel, ColumnAligner, Frame,
    ModelMetadata, OneHotEncoder, ProbabilisticClassifier,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::{stratified_split, Dataset};
use crate::errors::{Result, TrainerError};
use crate::search::{BoostedSpace, CandidateScore, ForestSpace, SearchOutcome};

/// Model family to search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Boosted,
    Forest,
}

impl FromStr for ModelFamily {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "boosted" | "xgboost" | "gbdt" => Ok(ModelFamily::Boosted),
            "forest" | "rf" => Ok(ModelFamily::Forest),
            other => Err(TrainerError::Config(format!("unknown model family '{other}'"))),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Boosted => f.write_str("boosted"),
            ModelFamily::Forest => f.write_str("forest"),
        }
    }
}

/// Serializable summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub family: String,
    pub feature_names: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub imbalance_weight: f64,
    pub best_params: BTreeMap<String, String>,
    pub best_cv_score: f64,
    pub candidates: Vec<CandidateScore>,
    pub holdout_accuracy: f64,
    pub classification_report: ClassificationReport,
    /// Held-out columns synthesized or dropped during alignment
    pub zero_filled_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
}

impl TrainingReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(to_canonical_json_pretty(self)?)
    }

    /// Blake3 digest of the canonical JSON form
    pub fn digest_hex(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: ClassifierModel,
    pub report: TrainingReport,
}

/// Training pipeline driven by a `PipelineConfig`
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read, clean and validate the labelled table
    pub fn load_frame<P: AsRef<Path>>(&self, path: P) -> Result<Frame> {
        let path = path.as_ref();
        info!("Loading dataset from: {}", path.display());
        let frame = Frame::from_csv(path)?;
        self.prepare_frame(frame)
    }

    /// Apply renames and drops, require the label and drop incomplete rows
    pub fn prepare_frame(&self, mut frame: Frame) -> Result<Frame> {
        let columns = &self.config.columns;
        frame.rename_columns(&columns.rename)?;
        frame.drop_columns(&columns.drop);
        frame.require_column(&columns.label)?;

        let cleaned = frame.drop_incomplete(&[columns.group.as_str()]);
        info!(
            "Kept {} of {} rows with {} columns",
            cleaned.len(),
            frame.len(),
            cleaned.columns().len()
        );
        if cleaned.is_empty() {
            return Err(TrainerError::Dataset("no complete rows remain after cleaning".into()));
        }
        Ok(cleaned)
    }

    /// Train from a CSV file
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<TrainingOutcome> {
        let frame = self.load_frame(path)?;
        self.run_frame(&frame)
    }

    /// Train from an already prepared frame
    pub fn run_frame(&self, frame: &Frame) -> Result<TrainingOutcome> {
        let columns = &self.config.columns;
        let labels = frame.labels(&columns.label)?;

        let (train_pos, test_pos) = stratified_split(&labels, self.config.split.test_size, self.config.split.seed)?;
        let train_frame = frame.select_rows(&train_pos);
        let test_frame = frame.select_rows(&test_pos);
        let train_labels: Vec<u8> = train_pos.iter().map(|&p| labels[p]).collect();
        let test_labels: Vec<u8> = test_pos.iter().map(|&p| labels[p]).collect();
        info!("Split {} training and {} test rows", train_pos.len(), test_pos.len());

        let weight = imbalance_weight(&train_labels)?;
        info!("Positive-class weight: {:.4}", weight);

        let encoder = OneHotEncoder::new();
        let exclude = columns.non_features();
        let train_matrix = encoder.encode(&train_frame, &exclude)?;
        let test_matrix = encoder.encode(&test_frame, &exclude)?;

        let aligner = ColumnAligner::new(train_matrix.columns().to_vec(), AlignMode::Lenient);
        let (test_matrix, alignment) = aligner.align(&test_matrix)?;

        let train = Dataset::from_matrix(train_matrix, train_labels)?;
        let test = Dataset::from_matrix(test_matrix, test_labels)?;
        info!("Encoded {} feature columns: {:?}", train.feature_count(), train.feature_names);

        let search = self.config.search.randomized_search();
        let (model, summary) = match self.config.search.family {
            ModelFamily::Boosted => {
                let space = BoostedSpace {
                    grid: self.config.boosted.clone(),
                    scale_pos_weight: weight,
                };
                summarize(search.run(&space, &train)?)?
            }
            ModelFamily::Forest => {
                let space = ForestSpace {
                    grid: self.config.forest.clone(),
                };
                summarize(search.run(&space, &train)?)?
            }
        };

        let predicted = model.predict(&test.features);
        let holdout_accuracy = accuracy(&test.targets, &predicted);
        let classification_report = ClassificationReport::new(&test.targets, &predicted);
        info!("Accuracy: {:.4}", holdout_accuracy);
        info!("Classification Report:\n{}", classification_report);

        let metadata = ModelMetadata {
            params: summary.best_params.clone(),
            imbalance_weight: Some(weight),
            cv_score: Some(summary.best_score),
            holdout_accuracy: Some(holdout_accuracy),
            ..model.metadata.clone()
        };
        let model = model.with_metadata(metadata);

        let report = TrainingReport {
            family: summary.family.to_string(),
            feature_names: model.feature_names.clone(),
            train_rows: train.len(),
            test_rows: test.len(),
            imbalance_weight: weight,
            best_params: summary.best_params,
            best_cv_score: summary.best_score,
            candidates: summary.candidates,
            holdout_accuracy,
            classification_report,
            zero_filled_columns: alignment.zero_filled,
            dropped_columns: alignment.dropped,
        };

        Ok(TrainingOutcome { model, report })
    }
}

struct SearchSummary {
    family: &'static str,
    best_params: BTreeMap<String, String>,
    best_score: f64,
    candidates: Vec<CandidateScore>,
}

fn summarize<P: Serialize>(outcome: SearchOutcome<P>) -> Result<(ClassifierModel, SearchSummary)> {
    let best_params = outcome.best_params_record()?;
    Ok((
        outcome.model,
        SearchSummary {
            family: outcome.family,
            best_params,
            best_score: outcome.best_score,
            candidates: outcome.candidates,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::BoostedGrid;

    fn scenario_csv() -> String {
        let mut csv = String::from("slope,standClass,pixelGroup,lichenPresence\n");
        for i in 0..100 {
            let class = ["A", "B", "C"][i % 3];
            let label = u8::from(i % 10 < 3);
            csv.push_str(&format!("{},{},{},{}\n", (i * 7 % 50) as f64 / 2.0, class, i / 10, label));
        }
        csv
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.search.n_iter = 2;
        config.search.cv = 3;
        config.search.n_jobs = 2;
        config.boosted = BoostedGrid {
            n_estimators: vec![5, 10],
            max_depth: vec![2],
            learning_rate: vec![0.1],
            subsample: vec![1.0],
            colsample_bytree: vec![1.0],
        };
        config
    }

    #[test]
    fn test_family_parse() {
        assert_eq!("forest".parse::<ModelFamily>().unwrap(), ModelFamily::Forest);
        assert_eq!("XGBoost".parse::<ModelFamily>().unwrap(), ModelFamily::Boosted);
        assert!("svm".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_scenario_schema_and_metadata() {
        let frame = Frame::from_reader(scenario_csv().as_bytes()).unwrap();
        let pipeline = TrainingPipeline::new(fast_config());
        let frame = pipeline.prepare_frame(frame).unwrap();
        let outcome = pipeline.run_frame(&frame).unwrap();

        assert_eq!(outcome.model.feature_names, vec!["slope", "standClass_B", "standClass_C"]);
        assert_eq!(outcome.report.train_rows, 80);
        assert_eq!(outcome.report.test_rows, 20);
        assert!((outcome.report.imbalance_weight - 56.0 / 24.0).abs() < 1e-12);
        assert_eq!(outcome.model.metadata.imbalance_weight, Some(outcome.report.imbalance_weight));
        assert!(outcome.model.metadata.params.contains_key("n_estimators"));
        assert_eq!(outcome.report.candidates.len(), 2);

        let json = outcome.report.to_json().unwrap();
        assert!(json.contains("\"holdout_accuracy\""));

        let digest = outcome.report.digest_hex().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(outcome.report.clone().digest_hex().unwrap(), digest);
        let mut altered = outcome.report.clone();
        altered.holdout_accuracy += 0.5;
        assert_ne!(altered.digest_hex().unwrap(), digest);
    }

    #[test]
    fn test_missing_label_is_fatal() {
        let frame = Frame::from_reader("slope,standClass\n1,A\n2,B\n".as_bytes()).unwrap();
        let result = TrainingPipeline::new(fast_config()).prepare_frame(frame);
        assert!(matches!(
            result,
            Err(TrainerError::Core(lichen_core::CoreError::MissingColumn(_)))
        ));
    }

    #[test]
    fn test_renames_applied_before_label_check() {
        let frame = Frame::from_reader("slopeDEM,probability,x,y\n1,0,5,5\n2,1,6,6\n".as_bytes()).unwrap();
        let frame = TrainingPipeline::new(fast_config()).prepare_frame(frame).unwrap();
        assert_eq!(frame.columns(), &["slope".to_string(), "lichenPresence".to_string()]);
    }
}
