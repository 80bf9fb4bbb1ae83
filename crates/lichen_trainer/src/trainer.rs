//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Second-order boosting over CART trees. The logistic loss produces a
//! probabilistic classifier with a positive-class sample weight; absolute and
//! Huber losses regress the 0/1 label directly. Row and column subsampling
//! draw from a seeded RNG so a fixed seed reproduces the ensemble.

use lichen_core::{BoostLoss, ClassifierModel, Ensemble, Tree};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cart::{CartBuilder, Targets, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};

/// Residual magnitude at which the Huber loss turns linear
pub const HUBER_DELTA: f64 = 0.5;

/// Probabilities are clipped to this distance from 0 and 1 for the base score
const PROB_EPSILON: f64 = 1e-6;

/// GBDT training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtConfig {
    pub num_trees: usize,
    /// `None` grows until another limit stops it
    pub max_depth: Option<usize>,
    pub max_leaves: Option<usize>,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn without replacement for each tree
    pub subsample: f64,
    /// Fraction of features available to each tree
    pub colsample_bytree: f64,
    /// Sample weight applied to positive rows
    pub scale_pos_weight: f64,
    pub lambda: f64,
    pub min_child_weight: f64,
    pub loss: BoostLoss,
    pub seed: u64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: Some(6),
            max_leaves: None,
            min_samples_leaf: 1,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            scale_pos_weight: 1.0,
            lambda: 1.0,
            min_child_weight: 1.0,
            loss: BoostLoss::Logistic,
            seed: 42,
        }
    }
}

impl GbdtConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(TrainerError::Training("num_trees must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TrainerError::Training(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, fraction) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(TrainerError::Training(format!(
                    "{name} must be in (0, 1], got {fraction}"
                )));
            }
        }
        if !(self.scale_pos_weight > 0.0 && self.scale_pos_weight.is_finite()) {
            return Err(TrainerError::Training(format!(
                "scale_pos_weight must be positive, got {}",
                self.scale_pos_weight
            )));
        }
        if self.lambda < 0.0 || self.min_child_weight < 0.0 {
            return Err(TrainerError::Training(
                "lambda and min_child_weight must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Train a boosted classifier on the given dataset
    pub fn train(&self, dataset: &Dataset) -> Result<ClassifierModel> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(TrainerError::Training("cannot train on an empty dataset".into()));
        }

        let n_samples = dataset.len();
        let feature_count = dataset.feature_count();
        let weights: Vec<f64> = dataset
            .targets
            .iter()
            .map(|&t| if t == 1 { self.config.scale_pos_weight } else { 1.0 })
            .collect();

        let base_score = self.base_score(&dataset.targets, &weights);
        let mut raw = vec![base_score; n_samples];

        let mut rng = LcgRng::new(self.config.seed);
        let rows_per_tree = fraction_count(n_samples, self.config.subsample);
        let features_per_tree = fraction_count(feature_count, self.config.colsample_bytree);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            min_samples_split: 2,
            max_leaves: self.config.max_leaves,
            max_features: None,
            lambda: self.config.lambda,
            min_child_weight: self.config.min_child_weight,
        };

        let mut trees = Vec::with_capacity(self.config.num_trees);

        for tree_idx in 0..self.config.num_trees {
            let (gradients, hessians) = self.gradients_hessians(&dataset.targets, &raw, &weights);

            let mut rows = if rows_per_tree < n_samples {
                rng.sample_indices(n_samples, rows_per_tree)
            } else {
                (0..n_samples).collect()
            };
            rows.sort_unstable();

            let columns = if features_per_tree < feature_count {
                rng.sample_indices(feature_count, features_per_tree)
            } else {
                (0..feature_count).collect()
            };

            let builder = CartBuilder::new(
                &dataset.features,
                Targets::Gradients {
                    gradients: &gradients,
                    hessians: &hessians,
                },
                tree_config.clone(),
            )
            .with_features(columns);
            let mut tree = builder.build(&rows, &mut rng);
            tree.weight = self.config.learning_rate;

            self.update_predictions(&tree, &dataset.features, &mut raw);
            debug!(
                "Tree {}/{}: {} leaves",
                tree_idx + 1,
                self.config.num_trees,
                tree.leaf_count()
            );
            trees.push(tree);
        }

        Ok(ClassifierModel::new(
            dataset.feature_names.clone(),
            Ensemble::Boosted {
                base_score,
                loss: self.config.loss,
                trees,
            },
        ))
    }

    /// Initial raw score: weighted log-odds, label median or label mean
    fn base_score(&self, targets: &[u8], weights: &[f64]) -> f64 {
        match self.config.loss {
            BoostLoss::Logistic => {
                let total: f64 = weights.iter().sum();
                let positive: f64 = targets
                    .iter()
                    .zip(weights)
                    .filter(|(&t, _)| t == 1)
                    .map(|(_, &w)| w)
                    .sum();
                let p = (positive / total).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                (p / (1.0 - p)).ln()
            }
            BoostLoss::LeastAbsoluteDeviation => {
                let mut sorted: Vec<f64> = targets.iter().map(|&t| t as f64).collect();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            BoostLoss::Huber => targets.iter().map(|&t| t as f64).sum::<f64>() / targets.len() as f64,
        }
    }

    /// Weighted first and second derivatives of the loss at the current scores
    fn gradients_hessians(&self, targets: &[u8], raw: &[f64], weights: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = targets.len();
        let mut gradients = Vec::with_capacity(n);
        let mut hessians = Vec::with_capacity(n);

        for i in 0..n {
            let y = targets[i] as f64;
            let w = weights[i];
            match self.config.loss {
                BoostLoss::Logistic => {
                    let p = BoostLoss::Logistic.probability(raw[i]);
                    gradients.push(w * (p - y));
                    hessians.push((w * p * (1.0 - p)).max(1e-16));
                }
                BoostLoss::LeastAbsoluteDeviation => {
                    let residual = y - raw[i];
                    gradients.push(-w * sign(residual));
                    hessians.push(w);
                }
                BoostLoss::Huber => {
                    let residual = y - raw[i];
                    let grad = if residual.abs() <= HUBER_DELTA {
                        -residual
                    } else {
                        -HUBER_DELTA * sign(residual)
                    };
                    gradients.push(w * grad);
                    hessians.push(w);
                }
            }
        }

        (gradients, hessians)
    }

    fn update_predictions(&self, tree: &Tree, features: &[Vec<f64>], raw: &mut [f64]) {
        for (i, feature_vec) in features.iter().enumerate() {
            raw[i] += tree.weight * tree.evaluate(feature_vec);
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `round(n * fraction)`, at least one when `n > 0`
pub(crate) fn fraction_count(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    ((n as f64 * fraction).round() as usize).clamp(1, n)
}
