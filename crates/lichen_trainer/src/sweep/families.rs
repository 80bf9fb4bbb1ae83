//! Classifier families and parameter grids explored by the sweep

use std::fmt;

use lichen_core::{BoostLoss, ProbabilisticClassifier};
use serde::{Deserialize, Serialize};

use super::knn::{DistanceMetric, KnnClassifier, SearchMethod};
use super::naive_bayes::NaiveBayesClassifier;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::forest::{ForestConfig, ForestTrainer, MaxFeatures, RowSampling};
use crate::trainer::{GbdtConfig, GbdtTrainer};

/// Classifier families in sweep order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    RandomForest,
    GradientTreeBoost,
    Knn,
    NaiveBayes,
    Cart,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::RandomForest,
        Family::GradientTreeBoost,
        Family::Knn,
        Family::NaiveBayes,
        Family::Cart,
    ];
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::RandomForest => "randomForest",
            Family::GradientTreeBoost => "gradientTreeBoost",
            Family::Knn => "knn",
            Family::NaiveBayes => "naiveBayes",
            Family::Cart => "cart",
        };
        f.write_str(name)
    }
}

/// Random forest grid; 0 means "unset" for `variables_per_split` and `max_nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestGrid {
    pub number_of_trees: Vec<usize>,
    pub variables_per_split: Vec<usize>,
    pub min_leaf_population: Vec<usize>,
    pub bag_fraction: Vec<f64>,
    pub max_nodes: Vec<usize>,
}

impl Default for RandomForestGrid {
    fn default() -> Self {
        Self {
            number_of_trees: vec![10, 50, 100],
            variables_per_split: vec![0, 5, 10, 20],
            min_leaf_population: vec![1, 5, 10],
            bag_fraction: vec![0.5, 0.7, 0.9],
            max_nodes: vec![0, 10, 20],
        }
    }
}

/// Gradient tree boosting grid; a `max_nodes` of 0 means unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientTreeBoostGrid {
    pub number_of_trees: Vec<usize>,
    pub shrinkage: Vec<f64>,
    pub sampling_rate: Vec<f64>,
    pub max_nodes: Vec<usize>,
    pub loss: Vec<BoostLoss>,
}

impl Default for GradientTreeBoostGrid {
    fn default() -> Self {
        Self {
            number_of_trees: vec![10, 50, 100],
            shrinkage: vec![0.005, 0.01, 0.1, 0.3],
            sampling_rate: vec![0.5, 0.7, 0.9],
            max_nodes: vec![0, 10, 20],
            loss: vec![BoostLoss::LeastAbsoluteDeviation, BoostLoss::Huber],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnGrid {
    pub k: Vec<usize>,
    pub search_method: Vec<SearchMethod>,
    pub metric: Vec<DistanceMetric>,
}

impl Default for KnnGrid {
    fn default() -> Self {
        Self {
            k: vec![1, 3, 5, 8],
            search_method: vec![SearchMethod::Auto, SearchMethod::KdTree, SearchMethod::CoverTree],
            metric: vec![
                DistanceMetric::Euclidean,
                DistanceMetric::Manhattan,
                DistanceMetric::Mahalanobis,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesGrid {
    pub lambda: Vec<f64>,
}

impl Default for NaiveBayesGrid {
    fn default() -> Self {
        Self {
            lambda: vec![1e-6, 1e-4, 1e-3, 1e-2, 1e-1],
        }
    }
}

/// CART grid; a `max_nodes` of 0 means unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartGrid {
    pub max_nodes: Vec<usize>,
    pub min_leaf_population: Vec<usize>,
}

impl Default for CartGrid {
    fn default() -> Self {
        Self {
            max_nodes: vec![0, 10, 20],
            min_leaf_population: vec![1, 5, 10],
        }
    }
}

/// Grids for every family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrids {
    pub random_forest: RandomForestGrid,
    pub gradient_tree_boost: GradientTreeBoostGrid,
    pub knn: KnnGrid,
    pub naive_bayes: NaiveBayesGrid,
    pub cart: CartGrid,
}

/// One combination of a family's hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "camelCase")]
pub enum SweepParams {
    #[serde(rename_all = "camelCase")]
    RandomForest {
        number_of_trees: usize,
        variables_per_split: usize,
        min_leaf_population: usize,
        bag_fraction: f64,
        max_nodes: usize,
    },
    #[serde(rename_all = "camelCase")]
    GradientTreeBoost {
        number_of_trees: usize,
        shrinkage: f64,
        sampling_rate: f64,
        max_nodes: usize,
        loss: BoostLoss,
    },
    #[serde(rename_all = "camelCase")]
    Knn {
        k: usize,
        search_method: SearchMethod,
        metric: DistanceMetric,
    },
    #[serde(rename_all = "camelCase")]
    NaiveBayes { lambda: f64 },
    #[serde(rename_all = "camelCase")]
    Cart {
        max_nodes: usize,
        min_leaf_population: usize,
    },
}

fn unlimited(value: usize) -> Option<usize> {
    (value > 0).then_some(value)
}

impl SweepParams {
    pub fn family(&self) -> Family {
        match self {
            SweepParams::RandomForest { .. } => Family::RandomForest,
            SweepParams::GradientTreeBoost { .. } => Family::GradientTreeBoost,
            SweepParams::Knn { .. } => Family::Knn,
            SweepParams::NaiveBayes { .. } => Family::NaiveBayes,
            SweepParams::Cart { .. } => Family::Cart,
        }
    }

    /// Train a classifier for this combination
    pub fn fit(&self, dataset: &Dataset, seed: u64) -> Result<Box<dyn ProbabilisticClassifier>> {
        let classifier: Box<dyn ProbabilisticClassifier> = match *self {
            SweepParams::RandomForest {
                number_of_trees,
                variables_per_split,
                min_leaf_population,
                bag_fraction,
                max_nodes,
            } => {
                let config = ForestConfig {
                    n_estimators: number_of_trees,
                    max_depth: None,
                    max_leaves: unlimited(max_nodes),
                    min_samples_leaf: min_leaf_population,
                    min_samples_split: 2,
                    max_features: match variables_per_split {
                        0 => MaxFeatures::Sqrt,
                        k => MaxFeatures::Count(k),
                    },
                    sampling: RowSampling::Bootstrap(bag_fraction),
                    seed,
                };
                Box::new(ForestTrainer::new(config).train(dataset)?)
            }
            SweepParams::GradientTreeBoost {
                number_of_trees,
                shrinkage,
                sampling_rate,
                max_nodes,
                loss,
            } => {
                let config = GbdtConfig {
                    num_trees: number_of_trees,
                    max_depth: None,
                    max_leaves: unlimited(max_nodes),
                    learning_rate: shrinkage,
                    subsample: sampling_rate,
                    loss,
                    lambda: 0.0,
                    min_child_weight: 0.0,
                    seed,
                    ..GbdtConfig::default()
                };
                Box::new(GbdtTrainer::new(config).train(dataset)?)
            }
            SweepParams::Knn { k, metric, .. } => Box::new(KnnClassifier::fit(dataset, k, metric)?),
            SweepParams::NaiveBayes { lambda } => Box::new(NaiveBayesClassifier::fit(dataset, lambda)?),
            SweepParams::Cart {
                max_nodes,
                min_leaf_population,
            } => {
                let config = ForestConfig {
                    n_estimators: 1,
                    max_depth: None,
                    max_leaves: unlimited(max_nodes),
                    min_samples_leaf: min_leaf_population,
                    min_samples_split: 2,
                    max_features: MaxFeatures::All,
                    sampling: RowSampling::All,
                    seed,
                };
                Box::new(ForestTrainer::new(config).train(dataset)?)
            }
        };
        Ok(classifier)
    }
}

impl SweepGrids {
    /// Cartesian product of one family's grid in a fixed order
    pub fn combinations(&self, family: Family) -> Vec<SweepParams> {
        let mut out = Vec::new();
        match family {
            Family::RandomForest => {
                let g = &self.random_forest;
                for &number_of_trees in &g.number_of_trees {
                    for &variables_per_split in &g.variables_per_split {
                        for &min_leaf_population in &g.min_leaf_population {
                            for &bag_fraction in &g.bag_fraction {
                                for &max_nodes in &g.max_nodes {
                                    out.push(SweepParams::RandomForest {
                                        number_of_trees,
                                        variables_per_split,
                                        min_leaf_population,
                                        bag_fraction,
                                        max_nodes,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Family::GradientTreeBoost => {
                let g = &self.gradient_tree_boost;
                for &number_of_trees in &g.number_of_trees {
                    for &shrinkage in &g.shrinkage {
                        for &sampling_rate in &g.sampling_rate {
                            for &max_nodes in &g.max_nodes {
                                for &loss in &g.loss {
                                    out.push(SweepParams::GradientTreeBoost {
                                        number_of_trees,
                                        shrinkage,
                                        sampling_rate,
                                        max_nodes,
                                        loss,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Family::Knn => {
                let g = &self.knn;
                for &k in &g.k {
                    for &search_method in &g.search_method {
                        for &metric in &g.metric {
                            out.push(SweepParams::Knn {
                                k,
                                search_method,
                                metric,
                            });
                        }
                    }
                }
            }
            Family::NaiveBayes => {
                for &lambda in &self.naive_bayes.lambda {
                    out.push(SweepParams::NaiveBayes { lambda });
                }
            }
            Family::Cart => {
                let g = &self.cart;
                for &max_nodes in &g.max_nodes {
                    for &min_leaf_population in &g.min_leaf_population {
                        out.push(SweepParams::Cart {
                            max_nodes,
                            min_leaf_population,
                        });
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::params_record;

    #[test]
    fn test_default_grid_sizes() {
        let grids = SweepGrids::default();
        assert_eq!(grids.combinations(Family::RandomForest).len(), 324);
        assert_eq!(grids.combinations(Family::GradientTreeBoost).len(), 216);
        assert_eq!(grids.combinations(Family::Knn).len(), 36);
        assert_eq!(grids.combinations(Family::NaiveBayes).len(), 5);
        assert_eq!(grids.combinations(Family::Cart).len(), 9);
    }

    #[test]
    fn test_params_family_and_record() {
        let params = SweepParams::Knn {
            k: 3,
            search_method: SearchMethod::KdTree,
            metric: DistanceMetric::Mahalanobis,
        };
        assert_eq!(params.family(), Family::Knn);

        let record = params_record(&params).unwrap();
        assert_eq!(record["family"], "knn");
        assert_eq!(record["searchMethod"], "KD_TREE");
        assert_eq!(record["metric"], "MAHALANOBIS");
    }

    #[test]
    fn test_every_family_fits() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64, ((i * 3) % 11) as f64])
            .collect();
        let targets: Vec<u8> = (0..40).map(|i| u8::from(i >= 25)).collect();
        let dataset = Dataset::new(vec!["A00".into(), "A01".into(), "A02".into()], features, targets).unwrap();

        let grids = SweepGrids::default();
        for family in Family::ALL {
            let params = grids.combinations(family)[0];
            let classifier = params.fit(&dataset, 42).unwrap();
            let probs = classifier.predict_proba(&dataset.features);
            assert_eq!(probs.len(), 40);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }
}
