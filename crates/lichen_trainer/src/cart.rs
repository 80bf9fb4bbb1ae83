//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy, depth-first tree construction shared by the boosted and
//! bagged trainers. Boosting grows trees on gradient/hessian statistics with
//! second-order gain; forests grow them on 0/1 targets with Gini impurity.
//! Candidate thresholds are midpoints between consecutive distinct values.

use lichen_core::{Node, Tree};

use crate::deterministic::{LcgRng, SplitTieBreaker};

/// Per-row statistics a tree is fitted to
#[derive(Clone, Copy, Debug)]
pub enum Targets<'a> {
    /// First and second loss derivatives; leaves hold Newton steps
    Gradients { gradients: &'a [f64], hessians: &'a [f64] },
    /// Binary labels; leaves hold the positive fraction
    Classes(&'a [u8]),
}

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// `None` grows until another limit stops it
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Upper bound on the number of leaves
    pub max_leaves: Option<usize>,
    /// Features examined per split; `None` examines every allowed feature
    pub max_features: Option<usize>,
    /// L2 penalty on leaf values (gradient targets only)
    pub lambda: f64,
    /// Minimum hessian sum per child (gradient targets only)
    pub min_child_weight: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(6),
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_leaves: None,
            max_features: None,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: f64, gain: f64) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
        }
    }

    fn beats(&self, current: &SplitCandidate) -> bool {
        self.gain > current.gain
            || (self.gain == current.gain && self.tie_breaker.precedes(&current.tie_breaker))
    }
}

/// Running sums for one side of a split
#[derive(Clone, Copy, Debug, Default)]
struct Sums {
    count: usize,
    grad: f64,
    hess: f64,
    positives: f64,
}

/// Build a tree over a row subset using exact-greedy CART
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    targets: Targets<'a>,
    allowed_features: Vec<usize>,
}

impl<'a> CartBuilder<'a> {
    pub fn new(features: &'a [Vec<f64>], targets: Targets<'a>, config: TreeConfig) -> Self {
        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            config,
            features,
            targets,
            allowed_features: (0..feature_count).collect(),
        }
    }

    /// Restrict splits to a feature subset (column subsampling)
    pub fn with_features(mut self, mut allowed: Vec<usize>) -> Self {
        allowed.sort_unstable();
        allowed.dedup();
        self.allowed_features = allowed;
        self
    }

    /// Build a tree from the rows at `indices` (duplicates allowed)
    pub fn build(&self, indices: &[usize], rng: &mut LcgRng) -> Tree {
        let mut nodes = Vec::new();
        let mut leaves = 1usize;
        self.build_node(indices, 0, &mut nodes, &mut leaves, rng);
        Tree::new(nodes, 1.0)
    }

    fn push_leaf(&self, nodes: &mut Vec<Node>, value: f64) -> i32 {
        let id = nodes.len() as i32;
        nodes.push(Node::leaf(id, value));
        id
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        leaves: &mut usize,
        rng: &mut LcgRng,
    ) -> i32 {
        let totals = self.sums(indices);
        let leaf_value = self.leaf_value(&totals);

        let depth_reached = self.config.max_depth.is_some_and(|d| depth >= d);
        let leaves_exhausted = self.config.max_leaves.is_some_and(|m| *leaves >= m);
        let too_small = indices.len() < self.config.min_samples_split.max(2)
            || indices.len() < 2 * self.config.min_samples_leaf.max(1);

        if depth_reached || leaves_exhausted || too_small || self.is_pure(&totals) {
            return self.push_leaf(nodes, leaf_value);
        }

        let split = match self.find_best_split(indices, &totals, rng) {
            Some(s) => s,
            None => return self.push_leaf(nodes, leaf_value),
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.features[i][split.feature_idx] <= split.threshold);

        *leaves += 1;

        // Reserve space for current node
        let current_idx = nodes.len();
        nodes.push(Node::internal(
            current_idx as i32,
            split.feature_idx as i32,
            split.threshold,
            0,
            0,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, leaves, rng);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, leaves, rng);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    fn sums(&self, indices: &[usize]) -> Sums {
        let mut sums = Sums::default();
        for &i in indices {
            self.accumulate(&mut sums, i);
        }
        sums
    }

    fn accumulate(&self, sums: &mut Sums, i: usize) {
        sums.count += 1;
        match self.targets {
            Targets::Gradients { gradients, hessians } => {
                sums.grad += gradients[i];
                sums.hess += hessians[i];
            }
            Targets::Classes(labels) => sums.positives += labels[i] as f64,
        }
    }

    fn is_pure(&self, totals: &Sums) -> bool {
        match self.targets {
            Targets::Gradients { .. } => false,
            Targets::Classes(_) => totals.positives == 0.0 || totals.positives == totals.count as f64,
        }
    }

    /// Newton step `-G / (H + lambda)` or the positive fraction
    fn leaf_value(&self, totals: &Sums) -> f64 {
        match self.targets {
            Targets::Gradients { .. } => {
                let denom = totals.hess + self.config.lambda;
                if denom <= 0.0 {
                    0.0
                } else {
                    -totals.grad / denom
                }
            }
            Targets::Classes(_) => {
                if totals.count == 0 {
                    0.0
                } else {
                    totals.positives / totals.count as f64
                }
            }
        }
    }

    /// Node score whose increase measures split quality
    fn score(&self, sums: &Sums) -> f64 {
        match self.targets {
            Targets::Gradients { .. } => {
                let denom = sums.hess + self.config.lambda;
                if denom <= 0.0 {
                    0.0
                } else {
                    sums.grad * sums.grad / denom
                }
            }
            // Negative Gini impurity weighted by row count.
            Targets::Classes(_) => {
                if sums.count == 0 {
                    return 0.0;
                }
                let n = sums.count as f64;
                let p = sums.positives / n;
                -n * 2.0 * p * (1.0 - p)
            }
        }
    }

    fn child_allowed(&self, sums: &Sums) -> bool {
        if sums.count < self.config.min_samples_leaf.max(1) {
            return false;
        }
        match self.targets {
            Targets::Gradients { .. } => sums.hess >= self.config.min_child_weight,
            Targets::Classes(_) => true,
        }
    }

    fn candidate_features(&self, rng: &mut LcgRng) -> Vec<usize> {
        match self.config.max_features {
            Some(k) if k < self.allowed_features.len() => {
                let mut chosen: Vec<usize> = rng
                    .sample_indices(self.allowed_features.len(), k.max(1))
                    .into_iter()
                    .map(|i| self.allowed_features[i])
                    .collect();
                chosen.sort_unstable();
                chosen
            }
            _ => self.allowed_features.clone(),
        }
    }

    /// Find best split using exact-greedy scan over sorted feature values
    fn find_best_split(&self, indices: &[usize], totals: &Sums, rng: &mut LcgRng) -> Option<SplitCandidate> {
        let parent_score = self.score(totals);
        let mut best_split: Option<SplitCandidate> = None;

        for feature_idx in self.candidate_features(rng) {
            let mut ordered: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.features[i][feature_idx], i))
                .collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Sums::default();
            for pos in 0..ordered.len() - 1 {
                let (value, row) = ordered[pos];
                self.accumulate(&mut left, row);

                let next = ordered[pos + 1].0;
                if value.is_nan() || next.is_nan() || value == next {
                    continue;
                }

                let right = Sums {
                    count: totals.count - left.count,
                    grad: totals.grad - left.grad,
                    hess: totals.hess - left.hess,
                    positives: totals.positives - left.positives,
                };

                if !self.child_allowed(&left) || !self.child_allowed(&right) {
                    continue;
                }

                let gain = self.score(&left) + self.score(&right) - parent_score;
                if gain <= 0.0 {
                    continue;
                }

                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next || !threshold.is_finite() {
                    threshold = value;
                }

                let candidate = SplitCandidate::new(feature_idx, threshold, gain);
                best_split = match best_split {
                    Some(current) if !candidate.beats(&current) => Some(current),
                    _ => Some(candidate),
                };
            }
        }

        best_split
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gini_tree_separates_classes() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0], vec![10.0], vec![11.0], vec![12.0]];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let builder = CartBuilder::new(&features, Targets::Classes(&labels), TreeConfig::default());
        let tree = builder.build(&(0..6).collect::<Vec<_>>(), &mut LcgRng::new(1));

        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].threshold, 6.5);
        assert_eq!(tree.evaluate(&[0.0]), 0.0);
        assert_eq!(tree.evaluate(&[20.0]), 1.0);
        assert!(tree.validate(1).is_ok());
    }

    #[test]
    fn test_newton_leaves() {
        let features = vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]];
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1.0; 4];
        let config = TreeConfig {
            lambda: 0.0,
            ..TreeConfig::default()
        };
        let builder = CartBuilder::new(
            &features,
            Targets::Gradients {
                gradients: &gradients,
                hessians: &hessians,
            },
            config,
        );
        let tree = builder.build(&[0, 1, 2, 3], &mut LcgRng::new(1));

        assert_eq!(tree.evaluate(&[0.0]), 1.0);
        assert_eq!(tree.evaluate(&[1.0]), -1.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = vec![vec![1.0]];
        let labels = vec![1];
        let builder = CartBuilder::new(&features, Targets::Classes(&labels), TreeConfig::default());
        let tree = builder.build(&[0], &mut LcgRng::new(1));

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf, Some(1.0));
    }

    #[test]
    fn test_max_leaves_caps_growth() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..16).map(|i| (i % 2) as u8).collect();
        let config = TreeConfig {
            max_depth: None,
            max_leaves: Some(3),
            ..TreeConfig::default()
        };
        let builder = CartBuilder::new(&features, Targets::Classes(&labels), config);
        let tree = builder.build(&(0..16).collect::<Vec<_>>(), &mut LcgRng::new(1));

        assert!(tree.leaf_count() <= 3);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let features: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let labels = vec![1, 0, 0, 0, 0, 0];
        let config = TreeConfig {
            min_samples_leaf: 2,
            ..TreeConfig::default()
        };
        let builder = CartBuilder::new(&features, Targets::Classes(&labels), config);
        let tree = builder.build(&(0..6).collect::<Vec<_>>(), &mut LcgRng::new(1));

        // The lone positive cannot be isolated, so the first split is at 1.5.
        assert_eq!(tree.nodes[0].threshold, 1.5);
    }

    #[test]
    fn test_restricted_features() {
        let features = vec![vec![0.0, 5.0], vec![1.0, 5.0], vec![0.0, 6.0], vec![1.0, 6.0]];
        let labels = vec![0, 0, 1, 1];
        let builder = CartBuilder::new(&features, Targets::Classes(&labels), TreeConfig::default())
            .with_features(vec![0]);
        let tree = builder.build(&[0, 1, 2, 3], &mut LcgRng::new(1));

        // Feature 0 carries no signal and feature 1 is excluded.
        assert_eq!(tree.nodes.len(), 1);
    }
}
