//! Numeric training datasets and stratified partitioning
//!
//! A `Dataset` is an aligned feature matrix with its canonical column names
//! and 0/1 targets. Splits and folds keep each class's share of rows.

use lichen_core::EncodedMatrix;
use tracing::warn;

use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};

/// Training dataset with float features and binary targets
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<u8>,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>, features: Vec<Vec<f64>>, targets: Vec<u8>) -> Result<Self> {
        if features.len() != targets.len() {
            return Err(TrainerError::Dataset(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if let Some((i, row)) = features
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != feature_names.len())
        {
            return Err(TrainerError::Dataset(format!(
                "row {}: expected {} features, got {}",
                i,
                feature_names.len(),
                row.len()
            )));
        }
        if let Some(bad) = targets.iter().find(|&&t| t > 1) {
            return Err(TrainerError::Dataset(format!("target {bad} is not 0 or 1")));
        }

        Ok(Self {
            feature_names,
            features,
            targets,
        })
    }

    /// Pair an encoded matrix with its labels
    pub fn from_matrix(matrix: EncodedMatrix, targets: Vec<u8>) -> Result<Self> {
        let feature_names = matrix.columns().to_vec();
        Self::new(feature_names, matrix.into_rows(), targets)
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of rows per class, indexed by label
    pub fn class_counts(&self) -> [usize; 2] {
        class_counts(&self.targets)
    }

    /// Rows at the given positions, in that order
    pub fn subset(&self, positions: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: positions.iter().map(|&p| self.features[p].clone()).collect(),
            targets: positions.iter().map(|&p| self.targets[p]).collect(),
        }
    }
}

pub fn class_counts(labels: &[u8]) -> [usize; 2] {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    [labels.len() - positives, positives]
}

fn positions_by_class(labels: &[u8]) -> [Vec<usize>; 2] {
    let mut by_class = [Vec::new(), Vec::new()];
    for (i, &l) in labels.iter().enumerate() {
        by_class[(l & 1) as usize].push(i);
    }
    by_class
}

/// Stratified hold-out split returning `(train, test)` positions
///
/// Each class contributes `round(count * test_size)` rows (at least one) to
/// the test side, drawn with the seeded RNG. Both sides come back sorted.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainerError::Config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let mut rng = LcgRng::new(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (class, mut members) in positions_by_class(labels).into_iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        if members.len() < 2 {
            return Err(TrainerError::Dataset(format!(
                "class {class} has only {} member; stratified split needs at least 2",
                members.len()
            )));
        }

        let n_test = ((members.len() as f64 * test_size).round() as usize).clamp(1, members.len() - 1);
        rng.shuffle(&mut members);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Stratified k-fold partition returning the held-out positions of each fold
///
/// Rows are not shuffled. Per-class fold sizes differ by at most one and each
/// class's rows are assigned to folds in contiguous blocks, in input order.
pub fn stratified_folds(labels: &[u8], k: usize) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(TrainerError::Config(format!("cv must be at least 2, got {k}")));
    }
    if k > labels.len() {
        return Err(TrainerError::Dataset(format!(
            "cannot make {k} folds from {} rows",
            labels.len()
        )));
    }

    let by_class = positions_by_class(labels);
    let counts = [by_class[0].len(), by_class[1].len()];
    for (class, &count) in counts.iter().enumerate() {
        if count > 0 && count < k {
            warn!(
                "class {} has {} members, fewer than the {} folds requested",
                class, count, k
            );
        }
    }

    // Deal the label-sorted rows round-robin to decide per-fold class sizes.
    let mut allocation = vec![[0usize; 2]; k];
    for position in 0..labels.len() {
        let class = usize::from(position >= counts[0]);
        allocation[position % k][class] += 1;
    }

    let mut folds = vec![Vec::new(); k];
    for (class, members) in by_class.iter().enumerate() {
        let mut cursor = 0;
        for (fold, sizes) in allocation.iter().enumerate() {
            let take = sizes[class];
            folds[fold].extend_from_slice(&members[cursor..cursor + take]);
            cursor += take;
        }
    }

    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Complement of a fold within `0..n`
pub fn training_positions(n: usize, held_out: &[usize]) -> Vec<usize> {
    let mut mask = vec![true; n];
    for &p in held_out {
        mask[p] = false;
    }
    (0..n).filter(|&p| mask[p]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_70_30() -> Vec<u8> {
        (0..100).map(|i| u8::from(i % 10 >= 7)).collect()
    }

    #[test]
    fn test_split_preserves_class_ratio() {
        let labels = labels_70_30();
        let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);

        let test_labels: Vec<u8> = test.iter().map(|&i| labels[i]).collect();
        assert_eq!(class_counts(&test_labels), [14, 6]);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_determinism() {
        let labels = labels_70_30();
        assert_eq!(
            stratified_split(&labels, 0.2, 42).unwrap(),
            stratified_split(&labels, 0.2, 42).unwrap()
        );
        assert_ne!(
            stratified_split(&labels, 0.2, 42).unwrap().1,
            stratified_split(&labels, 0.2, 7).unwrap().1
        );
    }

    #[test]
    fn test_split_rejects_singleton_class() {
        let labels = [0, 0, 0, 1];
        assert!(stratified_split(&labels, 0.25, 1).is_err());
    }

    #[test]
    fn test_folds_are_stratified_partition() {
        let labels = labels_70_30();
        let folds = stratified_folds(&labels, 5).unwrap();

        assert_eq!(folds.len(), 5);
        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        for fold in &folds {
            let fold_labels: Vec<u8> = fold.iter().map(|&i| labels[i]).collect();
            assert_eq!(class_counts(&fold_labels), [14, 6]);
        }
    }

    #[test]
    fn test_folds_reject_bad_k() {
        assert!(stratified_folds(&[0, 1, 0], 1).is_err());
        assert!(stratified_folds(&[0, 1, 0], 4).is_err());
    }

    #[test]
    fn test_training_positions_complement() {
        assert_eq!(training_positions(5, &[1, 3]), vec![0, 2, 4]);
    }

    #[test]
    fn test_dataset_rejects_ragged_rows() {
        let result = Dataset::new(vec!["a".into()], vec![vec![1.0, 2.0]], vec![0]);
        assert!(matches!(result, Err(TrainerError::Dataset(_))));
    }
}
