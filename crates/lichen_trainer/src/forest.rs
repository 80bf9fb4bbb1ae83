//! Random forest trainer
//!
//! Bagged Gini trees grown in parallel. Each tree draws its rows and its
//! per-split feature subsets from an RNG derived from the forest seed and the
//! tree index, so the result does not depend on thread scheduling.

use std::fmt;
use std::str::FromStr;

use lichen_core::{ClassifierModel, Ensemble, Tree};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cart::{CartBuilder, Targets, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};
use crate::trainer::fraction_count;

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    /// Resolve against the number of available features (at least one)
    pub fn resolve(self, feature_count: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (feature_count as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (feature_count as f64).log2().floor() as usize,
            MaxFeatures::All => feature_count,
            MaxFeatures::Count(k) => k.min(feature_count),
        };
        n.max(1)
    }
}

impl FromStr for MaxFeatures {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqrt" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            "all" | "none" => Ok(MaxFeatures::All),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|&k| k > 0)
                .map(MaxFeatures::Count)
                .ok_or_else(|| TrainerError::Config(format!("invalid max_features '{s}'"))),
        }
    }
}

impl TryFrom<String> for MaxFeatures {
    type Error = TrainerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MaxFeatures> for String {
    fn from(value: MaxFeatures) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::All => f.write_str("all"),
            MaxFeatures::Count(k) => write!(f, "{k}"),
        }
    }
}

/// Rows each tree is grown on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RowSampling {
    /// Every training row, once
    All,
    /// `round(n * fraction)` rows drawn with replacement
    Bootstrap(f64),
}

/// Random forest training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_leaves: Option<usize>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub sampling: RowSampling,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            max_leaves: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            sampling: RowSampling::Bootstrap(1.0),
            seed: 42,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(TrainerError::Training("n_estimators must be positive".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(TrainerError::Training("min_samples_leaf must be positive".into()));
        }
        if self.min_samples_split < 2 {
            return Err(TrainerError::Training(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.max_leaves.is_some_and(|m| m < 2) {
            return Err(TrainerError::Training("max_leaves must be at least 2".into()));
        }
        if let RowSampling::Bootstrap(fraction) = self.sampling {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(TrainerError::Training(format!(
                    "bootstrap fraction must be in (0, 1], got {fraction}"
                )));
            }
        }
        Ok(())
    }
}

/// Random forest trainer
pub struct ForestTrainer {
    config: ForestConfig,
}

impl ForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train a forest classifier on the given dataset
    pub fn train(&self, dataset: &Dataset) -> Result<ClassifierModel> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(TrainerError::Training("cannot train on an empty dataset".into()));
        }

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            min_samples_split: self.config.min_samples_split,
            max_leaves: self.config.max_leaves,
            max_features: Some(self.config.max_features.resolve(dataset.feature_count())),
            lambda: 0.0,
            min_child_weight: 0.0,
        };

        let trees: Vec<Tree> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| self.grow_tree(dataset, &tree_config, tree_idx))
            .collect();

        debug!(
            "Grew {} trees with {} leaves in total",
            trees.len(),
            trees.iter().map(Tree::leaf_count).sum::<usize>()
        );

        Ok(ClassifierModel::new(
            dataset.feature_names.clone(),
            Ensemble::Forest { trees },
        ))
    }

    fn grow_tree(&self, dataset: &Dataset, tree_config: &TreeConfig, tree_idx: usize) -> Tree {
        let mut rng = LcgRng::derive(self.config.seed, tree_idx as u64);
        let n = dataset.len();

        let mut rows = match self.config.sampling {
            RowSampling::All => (0..n).collect(),
            RowSampling::Bootstrap(fraction) => rng.sample_with_replacement(n, fraction_count(n, fraction)),
        };
        rows.sort_unstable();

        let builder = CartBuilder::new(
            &dataset.features,
            Targets::Classes(&dataset.targets),
            tree_config.clone(),
        );
        builder.build(&rows, &mut rng)
    }
}
