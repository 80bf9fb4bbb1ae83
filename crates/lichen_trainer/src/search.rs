//! Randomized hyperparameter search with stratified k-fold cross-validation
//!
//! A `SearchSpace` enumerates its grid in a fixed order and knows how to fit
//! one parameter combination. `RandomizedSearch` draws a subset of the grid
//! with the seeded RNG, scores every draw by mean fold accuracy on a rayon
//! pool, keeps the best (ties go to the earliest draw) and refits it on the
//! whole training set.

use std::collections::BTreeMap;
use std::fmt::Debug;

use lichen_core::{accuracy, ClassifierModel, ProbabilisticClassifier};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{stratified_folds, training_positions, Dataset};
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};
use crate::forest::{ForestConfig, ForestTrainer, MaxFeatures, RowSampling};
use crate::trainer::{GbdtConfig, GbdtTrainer};

/// RNG stream used to draw grid combinations
const SAMPLING_STREAM: u64 = 0;

/// A family of models and the grid of hyperparameters to search over
pub trait SearchSpace: Sync {
    type Params: Clone + Debug + Serialize + Send + Sync;

    fn family(&self) -> &'static str;

    /// Cartesian product of the grid in a fixed order
    fn candidates(&self) -> Vec<Self::Params>;

    /// Fit one combination with the given seed
    fn fit(&self, params: &Self::Params, dataset: &Dataset, seed: u64) -> Result<ClassifierModel>;
}

/// Grid for the boosted family; a `max_depth` of 0 means unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample_bytree: Vec<f64>,
}

impl Default for BoostedGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![3, 6, 10],
            learning_rate: vec![0.01, 0.1, 0.2],
            subsample: vec![0.8, 1.0],
            colsample_bytree: vec![0.8, 1.0],
        }
    }
}

impl BoostedGrid {
    pub fn is_empty(&self) -> bool {
        self.n_estimators.is_empty()
            || self.max_depth.is_empty()
            || self.learning_rate.is_empty()
            || self.subsample.is_empty()
            || self.colsample_bytree.is_empty()
    }
}

/// One boosted-family combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostedParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
}

/// Boosted trees with a fixed positive-class weight
#[derive(Debug, Clone)]
pub struct BoostedSpace {
    pub grid: BoostedGrid,
    pub scale_pos_weight: f64,
}

impl SearchSpace for BoostedSpace {
    type Params = BoostedParams;

    fn family(&self) -> &'static str {
        "boosted"
    }

    fn candidates(&self) -> Vec<BoostedParams> {
        let g = &self.grid;
        let mut out = Vec::new();
        for &n_estimators in &g.n_estimators {
            for &max_depth in &g.max_depth {
                for &learning_rate in &g.learning_rate {
                    for &subsample in &g.subsample {
                        for &colsample_bytree in &g.colsample_bytree {
                            out.push(BoostedParams {
                                n_estimators,
                                max_depth,
                                learning_rate,
                                subsample,
                                colsample_bytree,
                            });
                        }
                    }
                }
            }
        }
        out
    }

    fn fit(&self, params: &BoostedParams, dataset: &Dataset, seed: u64) -> Result<ClassifierModel> {
        let config = GbdtConfig {
            num_trees: params.n_estimators,
            max_depth: (params.max_depth > 0).then_some(params.max_depth),
            learning_rate: params.learning_rate,
            subsample: params.subsample,
            colsample_bytree: params.colsample_bytree,
            scale_pos_weight: self.scale_pos_weight,
            seed,
            ..GbdtConfig::default()
        };
        GbdtTrainer::new(config).train(dataset)
    }
}

/// Grid for the forest family; a `max_depth` of 0 means unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub min_samples_leaf: Vec<usize>,
    pub min_samples_split: Vec<usize>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200],
            max_depth: vec![10, 20, 0],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
            min_samples_leaf: vec![1, 2, 4],
            min_samples_split: vec![2, 5, 10],
        }
    }
}

impl ForestGrid {
    pub fn is_empty(&self) -> bool {
        self.n_estimators.is_empty()
            || self.max_depth.is_empty()
            || self.max_features.is_empty()
            || self.min_samples_leaf.is_empty()
            || self.min_samples_split.is_empty()
    }
}

/// One forest-family combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// 0 means unlimited
    pub max_depth: usize,
    pub max_features: MaxFeatures,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

/// Bootstrapped Gini forests
#[derive(Debug, Clone, Default)]
pub struct ForestSpace {
    pub grid: ForestGrid,
}

impl SearchSpace for ForestSpace {
    type Params = ForestParams;

    fn family(&self) -> &'static str {
        "forest"
    }

    fn candidates(&self) -> Vec<ForestParams> {
        let g = &self.grid;
        let mut out = Vec::new();
        for &n_estimators in &g.n_estimators {
            for &max_depth in &g.max_depth {
                for &max_features in &g.max_features {
                    for &min_samples_leaf in &g.min_samples_leaf {
                        for &min_samples_split in &g.min_samples_split {
                            out.push(ForestParams {
                                n_estimators,
                                max_depth,
                                max_features,
                                min_samples_leaf,
                                min_samples_split,
                            });
                        }
                    }
                }
            }
        }
        out
    }

    fn fit(&self, params: &ForestParams, dataset: &Dataset, seed: u64) -> Result<ClassifierModel> {
        let config = ForestConfig {
            n_estimators: params.n_estimators,
            max_depth: (params.max_depth > 0).then_some(params.max_depth),
            max_leaves: None,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
            max_features: params.max_features,
            sampling: RowSampling::Bootstrap(1.0),
            seed,
        };
        ForestTrainer::new(config).train(dataset)
    }
}

/// Cross-validation result for one drawn combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Position of the combination in the enumerated grid
    pub grid_index: usize,
    pub params: BTreeMap<String, String>,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Result of a randomized search, including the refit model
#[derive(Debug, Clone)]
pub struct SearchOutcome<P> {
    pub family: &'static str,
    pub best_params: P,
    pub best_score: f64,
    /// Candidates in draw order
    pub candidates: Vec<CandidateScore>,
    pub model: ClassifierModel,
}

impl<P: Serialize> SearchOutcome<P> {
    pub fn best_params_record(&self) -> Result<BTreeMap<String, String>> {
        params_record(&self.best_params)
    }
}

/// Randomized search settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomizedSearch {
    pub n_iter: usize,
    pub cv: usize,
    pub n_jobs: usize,
    pub seed: u64,
}

impl Default for RandomizedSearch {
    fn default() -> Self {
        Self {
            n_iter: 20,
            cv: 5,
            n_jobs: 20,
            seed: 42,
        }
    }
}

impl RandomizedSearch {
    /// Grid positions to evaluate, in draw order
    pub fn draw(&self, grid_size: usize) -> Vec<usize> {
        let mut rng = LcgRng::derive(self.seed, SAMPLING_STREAM);
        rng.sample_indices(grid_size, self.n_iter)
    }

    /// Search `space` on `dataset` and refit the winner on all of it
    pub fn run<S: SearchSpace>(&self, space: &S, dataset: &Dataset) -> Result<SearchOutcome<S::Params>> {
        if self.n_iter == 0 {
            return Err(TrainerError::Search("n_iter must be positive".into()));
        }

        let grid = space.candidates();
        if grid.is_empty() {
            return Err(TrainerError::Search(format!(
                "{} grid has no combinations",
                space.family()
            )));
        }

        let draws = self.draw(grid.len());
        let folds = stratified_folds(&dataset.targets, self.cv)?;
        info!(
            "Fitting {} folds for each of {} {} candidates, totalling {} fits",
            folds.len(),
            draws.len(),
            space.family(),
            folds.len() * draws.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()
            .map_err(|e| TrainerError::Search(format!("failed to build thread pool: {e}")))?;

        let jobs: Vec<(usize, usize)> = (0..draws.len())
            .flat_map(|d| (0..folds.len()).map(move |f| (d, f)))
            .collect();

        let scores: Vec<f64> = pool.install(|| {
            jobs.par_iter()
                .map(|&(d, f)| self.score_fold(space, &grid[draws[d]], dataset, &folds[f]))
                .collect::<Result<Vec<f64>>>()
        })?;

        let mut candidates = Vec::with_capacity(draws.len());
        for (d, &grid_index) in draws.iter().enumerate() {
            let fold_scores = scores[d * folds.len()..(d + 1) * folds.len()].to_vec();
            let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            let params = params_record(&grid[grid_index])?;
            debug!("[CV {}/{}] {:?} mean accuracy {:.4}", d + 1, draws.len(), params, mean_score);
            candidates.push(CandidateScore {
                grid_index,
                params,
                fold_scores,
                mean_score,
            });
        }

        let mut best = 0;
        for (d, candidate) in candidates.iter().enumerate() {
            if candidate.mean_score > candidates[best].mean_score {
                best = d;
            }
        }

        let best_params = grid[draws[best]].clone();
        let best_score = candidates[best].mean_score;
        info!(
            "Best {} parameters: {:?} (CV accuracy {:.4})",
            space.family(),
            candidates[best].params,
            best_score
        );

        let model = space.fit(&best_params, dataset, self.seed)?;

        Ok(SearchOutcome {
            family: space.family(),
            best_params,
            best_score,
            candidates,
            model,
        })
    }

    fn score_fold<S: SearchSpace>(
        &self,
        space: &S,
        params: &S::Params,
        dataset: &Dataset,
        held_out: &[usize],
    ) -> Result<f64> {
        let train = dataset.subset(&training_positions(dataset.len(), held_out));
        let validation = dataset.subset(held_out);
        let model = space.fit(params, &train, self.seed)?;
        let predicted = model.predict(&validation.features);
        Ok(accuracy(&validation.targets, &predicted))
    }
}

/// Render a parameter struct as a flat name -> value map
pub fn params_record<P: Serialize>(params: &P) -> Result<BTreeMap<String, String>> {
    let value = serde_json::to_value(params)
        .map_err(|e| TrainerError::Search(format!("failed to record parameters: {e}")))?;

    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| {
                let rendered = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, rendered)
            })
            .collect()),
        other => Err(TrainerError::Search(format!(
            "parameters must serialize to an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_dataset() -> Dataset {
        let features: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, ((i * 13) % 7) as f64]).collect();
        let targets: Vec<u8> = (0..50).map(|i| u8::from(i % 10 >= 6)).collect();
        Dataset::new(vec!["a".into(), "b".into()], features, targets).unwrap()
    }

    fn small_forest_space() -> ForestSpace {
        ForestSpace {
            grid: ForestGrid {
                n_estimators: vec![3, 5],
                max_depth: vec![2, 0],
                max_features: vec![MaxFeatures::All],
                min_samples_leaf: vec![1, 2],
                min_samples_split: vec![2],
            },
        }
    }

    #[test]
    fn test_default_grid_sizes() {
        let boosted = BoostedSpace {
            grid: BoostedGrid::default(),
            scale_pos_weight: 1.0,
        };
        assert_eq!(boosted.candidates().len(), 108);
        assert_eq!(ForestSpace::default().candidates().len(), 108);
    }

    #[test]
    fn test_candidates_enumerate_last_key_fastest() {
        let space = small_forest_space();
        let grid = space.candidates();
        assert_eq!(grid.len(), 8);
        assert_eq!(grid[0].min_samples_leaf, 1);
        assert_eq!(grid[1].min_samples_leaf, 2);
        assert_eq!(grid[7].n_estimators, 5);
    }

    #[test]
    fn test_draw_is_capped_and_distinct() {
        let search = RandomizedSearch {
            n_iter: 20,
            ..RandomizedSearch::default()
        };
        let mut draws = search.draw(8);
        assert_eq!(draws.len(), 8);
        draws.sort_unstable();
        assert_eq!(draws, (0..8).collect::<Vec<_>>());
        assert_eq!(search.draw(108).len(), 20);
    }

    #[test]
    fn test_search_is_deterministic() {
        let dataset = create_dataset();
        let search = RandomizedSearch {
            n_iter: 4,
            cv: 3,
            n_jobs: 2,
            seed: 42,
        };
        let space = small_forest_space();

        let a = search.run(&space, &dataset).unwrap();
        let b = search.run(&space, &dataset).unwrap();

        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.model.ensemble, b.model.ensemble);
        assert_eq!(a.candidates.len(), 4);
        assert!(a.candidates.iter().all(|c| c.fold_scores.len() == 3));
        assert!(a
            .candidates
            .iter()
            .all(|c| c.mean_score <= a.best_score));
    }

    #[test]
    fn test_ties_go_to_earliest_draw() {
        let dataset = create_dataset();
        let search = RandomizedSearch {
            n_iter: 8,
            cv: 2,
            n_jobs: 1,
            seed: 1,
        };
        let outcome = search.run(&small_forest_space(), &dataset).unwrap();

        let first_best = outcome
            .candidates
            .iter()
            .position(|c| c.mean_score == outcome.best_score)
            .unwrap();
        let expected = small_forest_space().candidates()[outcome.candidates[first_best].grid_index];
        assert_eq!(outcome.best_params, expected);
    }

    #[test]
    fn test_empty_grid_is_error() {
        let space = ForestSpace {
            grid: ForestGrid {
                n_estimators: vec![],
                ..ForestGrid::default()
            },
        };
        let result = RandomizedSearch::default().run(&space, &create_dataset());
        assert!(matches!(result, Err(TrainerError::Search(_))));
    }

    #[test]
    fn test_boosted_zero_depth_is_unlimited() {
        let space = BoostedSpace {
            grid: BoostedGrid::default(),
            scale_pos_weight: 1.0,
        };
        let params = BoostedParams {
            n_estimators: 3,
            max_depth: 0,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
        };
        let model = space.fit(&params, &create_dataset(), 42).unwrap();
        assert!(model.ensemble.trees().iter().all(|t| t.leaf_count() > 1));
    }

    #[test]
    fn test_params_record() {
        let record = params_record(&ForestParams {
            n_estimators: 200,
            max_depth: 20,
            max_features: MaxFeatures::Sqrt,
            min_samples_leaf: 2,
            min_samples_split: 5,
        })
        .unwrap();

        assert_eq!(record["max_features"], "sqrt");
        assert_eq!(record["n_estimators"], "200");
        assert_eq!(record.len(), 5);
    }
}
