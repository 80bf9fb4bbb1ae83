//! Multi-family hyperparameter sweep with a probability-averaging ensemble
//!
//! For every classifier family the sweep draws up to `samples_per_family`
//! combinations from the family's grid, trains each on the training
//! partition and scores its accuracy on the test partition. Combinations that
//! fail are logged and skipped. The best `top_k` combinations are retrained,
//! their positive-class probabilities averaged and thresholded, and the
//! ensemble is evaluated with an error matrix.

pub mod families;
pub mod knn;
pub mod naive_bayes;
pub mod source;

use std::collections::BTreeMap;
use std::path::Path;

use lichen_core::{accuracy, ErrorMatrix};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};
use crate::search::params_record;

pub use families::{Family, SweepGrids, SweepParams};
pub use knn::{DistanceMetric, KnnClassifier, SearchMethod};
pub use naive_bayes::NaiveBayesClassifier;
pub use source::{BoundingBox, CsvFeatureSource, FeatureSource, FeatureTable, Region, SourceColumns, TimeWindow};

/// Sweep settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub samples_per_family: usize,
    pub top_k: usize,
    /// Ensemble probability above which a record is classed positive
    pub threshold: f64,
    pub train_fraction: f64,
    pub seed: u64,
    pub region: String,
    pub year: i32,
    pub columns: SourceColumns,
    pub grids: SweepGrids,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            samples_per_family: 10,
            top_k: 10,
            threshold: 0.3,
            train_fraction: 0.8,
            seed: 42,
            region: "Yukon".into(),
            year: 2024,
            columns: SourceColumns::default(),
            grids: SweepGrids::default(),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_family == 0 || self.top_k == 0 {
            return Err(TrainerError::Config(
                "samples_per_family and top_k must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TrainerError::Config(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(TrainerError::Config(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        Ok(())
    }
}

/// Test-partition accuracy of one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboResult {
    pub family: Family,
    pub params: SweepParams,
    pub accuracy: f64,
}

/// A combination that failed to train or evaluate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCombo {
    pub family: Family,
    pub params: BTreeMap<String, String>,
    pub error: String,
}

/// Error-matrix evaluation of the thresholded ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleEvaluation {
    pub members: usize,
    pub threshold: f64,
    pub error_matrix: ErrorMatrix,
    pub accuracy: f64,
    pub kappa: f64,
    /// Indexed by class
    pub producers_accuracy: [f64; 2],
}

/// Ensemble output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPrediction {
    pub id: String,
    pub partition: String,
    pub label: u8,
    pub probability: f64,
    pub predicted_class: u8,
}

/// Everything a sweep produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Successful combinations ranked by accuracy, best first
    pub ranked: Vec<ComboResult>,
    pub skipped: Vec<SkippedCombo>,
    pub ensemble: EnsembleEvaluation,
    pub predictions: Vec<RecordPrediction>,
}

impl SweepOutcome {
    /// Write per-record ensemble probabilities and classes as CSV
    pub fn write_predictions<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["id", "partition", "label", "probability", "classification"])?;
        for p in &self.predictions {
            writer.write_record([
                p.id.clone(),
                p.partition.clone(),
                p.label.to_string(),
                p.probability.to_string(),
                p.predicted_class.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Runs the sweep over a sampled feature table
pub struct Sweep {
    config: SweepConfig,
}

impl Sweep {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    /// Sample from `source` with the configured region and year, then sweep
    pub fn run_source<S: FeatureSource>(&self, source: &S) -> Result<SweepOutcome> {
        let region = Region::named(self.config.region.clone());
        let window = TimeWindow::year(self.config.year)?;
        let table = source.sample(&region, &window)?;
        self.run(&table)
    }

    pub fn run(&self, table: &FeatureTable) -> Result<SweepOutcome> {
        self.config.validate()?;

        let (train_pos, test_pos) = table.partition(self.config.seed, self.config.train_fraction);
        if train_pos.is_empty() || test_pos.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "partition of {} records left an empty side ({} train, {} test)",
                table.len(),
                train_pos.len(),
                test_pos.len()
            )));
        }
        info!("Partitioned {} training and {} test records", train_pos.len(), test_pos.len());

        let full = Dataset::new(table.band_names.clone(), table.bands.clone(), table.labels.clone())?;
        let train = full.subset(&train_pos);
        let test = full.subset(&test_pos);

        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for (stream, family) in Family::ALL.into_iter().enumerate() {
            let combos = self.config.grids.combinations(family);
            if combos.is_empty() {
                warn!("{} grid is empty; skipping family", family);
                continue;
            }

            let mut rng = LcgRng::derive(self.config.seed, stream as u64 + 1);
            let draws = rng.sample_indices(combos.len(), self.config.samples_per_family);

            for &d in &draws {
                let params = combos[d];
                info!("Evaluating {} with {:?}", family, params);
                match self.evaluate(&params, &train, &test) {
                    Ok(acc) => {
                        info!("{:.3} accuracy for {} with {:?}", acc, family, params);
                        results.push(ComboResult {
                            family,
                            params,
                            accuracy: acc,
                        });
                    }
                    Err(e) => {
                        warn!("Error training {} with {:?}: {}", family, params, e);
                        skipped.push(SkippedCombo {
                            family,
                            params: params_record(&params)?,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        if results.is_empty() {
            return Err(TrainerError::Training(
                "every sweep combination failed; no ensemble can be built".into(),
            ));
        }

        // Stable sort keeps evaluation order among equal accuracies.
        results.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
        info!(
            "Best combination: {} with {:?} ({:.3})",
            results[0].family, results[0].params, results[0].accuracy
        );

        let members = &results[..self.config.top_k.min(results.len())];
        let all_rows: Vec<usize> = (0..full.len()).collect();
        let mut sums = vec![0.0; full.len()];
        for member in members {
            let classifier = member.params.fit(&train, self.config.seed)?;
            for (s, p) in sums.iter_mut().zip(classifier.predict_proba(&full.features)) {
                *s += p;
            }
        }

        let probabilities: Vec<f64> = sums.iter().map(|s| s / members.len() as f64).collect();
        let classes: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p > self.config.threshold))
            .collect();

        let test_actual: Vec<u8> = test_pos.iter().map(|&i| full.targets[i]).collect();
        let test_predicted: Vec<u8> = test_pos.iter().map(|&i| classes[i]).collect();
        let error_matrix = ErrorMatrix::from_labels(&test_actual, &test_predicted);
        let ensemble = EnsembleEvaluation {
            members: members.len(),
            threshold: self.config.threshold,
            error_matrix,
            accuracy: error_matrix.accuracy(),
            kappa: error_matrix.kappa(),
            producers_accuracy: error_matrix.producers_accuracy(),
        };
        info!("Ensemble accuracy: {:.4}", ensemble.accuracy);
        info!("Ensemble kappa: {:.4}", ensemble.kappa);
        info!("Negative class accuracy: {:.4}", ensemble.producers_accuracy[0]);
        info!("Positive class accuracy: {:.4}", ensemble.producers_accuracy[1]);

        let mut is_test = vec![false; full.len()];
        for &i in &test_pos {
            is_test[i] = true;
        }
        let predictions = all_rows
            .iter()
            .map(|&i| RecordPrediction {
                id: table.ids[i].clone(),
                partition: if is_test[i] { "test" } else { "train" }.to_string(),
                label: full.targets[i],
                probability: probabilities[i],
                predicted_class: classes[i],
            })
            .collect();

        Ok(SweepOutcome {
            ranked: results,
            skipped,
            ensemble,
            predictions,
        })
    }

    fn evaluate(&self, params: &SweepParams, train: &Dataset, test: &Dataset) -> Result<f64> {
        let classifier = params.fit(train, self.config.seed)?;
        let predicted = classifier.predict(&test.features);
        Ok(accuracy(&test.targets, &predicted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use families::{CartGrid, KnnGrid, NaiveBayesGrid};
    use lichen_core::BoostLoss;

    fn table(n: usize) -> FeatureTable {
        FeatureTable {
            ids: (0..n).map(|i| format!("pt{i}")).collect(),
            band_names: vec!["A00".into(), "A01".into()],
            bands: (0..n)
                .map(|i| vec![(i % 17) as f64, ((i * 5) % 13) as f64 + if i % 3 == 0 { 10.0 } else { 0.0 }])
                .collect(),
            labels: (0..n).map(|i| u8::from(i % 3 == 0)).collect(),
        }
    }

    fn small_grids() -> SweepGrids {
        SweepGrids {
            random_forest: families::RandomForestGrid {
                number_of_trees: vec![5],
                variables_per_split: vec![0],
                min_leaf_population: vec![1],
                bag_fraction: vec![0.7],
                max_nodes: vec![0],
            },
            gradient_tree_boost: families::GradientTreeBoostGrid {
                number_of_trees: vec![5],
                shrinkage: vec![0.1],
                sampling_rate: vec![0.7],
                max_nodes: vec![10],
                loss: vec![BoostLoss::Huber],
            },
            knn: KnnGrid {
                // k larger than the training set fails and is skipped.
                k: vec![3, 10_000],
                search_method: vec![SearchMethod::Auto],
                metric: vec![DistanceMetric::Euclidean],
            },
            naive_bayes: NaiveBayesGrid { lambda: vec![1e-3] },
            cart: CartGrid {
                max_nodes: vec![10],
                min_leaf_population: vec![1],
            },
        }
    }

    #[test]
    fn test_sweep_skips_failures_and_builds_ensemble() {
        let sweep = Sweep::new(SweepConfig {
            grids: small_grids(),
            ..SweepConfig::default()
        });
        let outcome = sweep.run(&table(120)).unwrap();

        assert_eq!(outcome.ranked.len(), 5);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].family, Family::Knn);
        assert_eq!(outcome.ensemble.members, 5);
        assert_eq!(outcome.predictions.len(), 120);
        assert!(outcome
            .ranked
            .windows(2)
            .all(|w| w[0].accuracy >= w[1].accuracy));
        assert!((0.0..=1.0).contains(&outcome.ensemble.accuracy));
    }

    #[test]
    fn test_sweep_is_deterministic() {
        let sweep = Sweep::new(SweepConfig {
            grids: small_grids(),
            top_k: 2,
            ..SweepConfig::default()
        });
        let a = sweep.run(&table(90)).unwrap();
        let b = sweep.run(&table(90)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ensemble.members, 2);
    }

    #[test]
    fn test_all_failures_is_error() {
        let grids = SweepGrids {
            knn: KnnGrid {
                k: vec![10_000],
                ..KnnGrid::default()
            },
            ..small_grids()
        };
        let grids = SweepGrids {
            random_forest: families::RandomForestGrid {
                number_of_trees: vec![],
                ..families::RandomForestGrid::default()
            },
            gradient_tree_boost: families::GradientTreeBoostGrid {
                number_of_trees: vec![],
                ..families::GradientTreeBoostGrid::default()
            },
            naive_bayes: NaiveBayesGrid { lambda: vec![-1.0] },
            cart: CartGrid {
                max_nodes: vec![],
                ..CartGrid::default()
            },
            ..grids
        };
        let result = Sweep::new(SweepConfig {
            grids,
            ..SweepConfig::default()
        })
        .run(&table(60));
        assert!(matches!(result, Err(TrainerError::Training(_))));
    }

    #[test]
    fn test_write_predictions_csv() {
        let sweep = Sweep::new(SweepConfig {
            grids: small_grids(),
            ..SweepConfig::default()
        });
        let outcome = sweep.run(&table(60)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.csv");
        outcome.write_predictions(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("id,partition,label,probability,classification"));
        assert_eq!(lines.count(), 60);
    }
}
