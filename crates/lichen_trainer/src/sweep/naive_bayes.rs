//! Gaussian naive Bayes classifier
//!
//! Per-class feature means and variances with variance smoothing: `lambda`
//! times the largest feature variance is added to every variance.

use lichen_core::ProbabilisticClassifier;

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};

/// Fitted Gaussian naive Bayes model
#[derive(Debug, Clone)]
pub struct NaiveBayesClassifier {
    log_priors: [f64; 2],
    means: [Vec<f64>; 2],
    variances: [Vec<f64>; 2],
}

impl NaiveBayesClassifier {
    pub fn fit(dataset: &Dataset, lambda: f64) -> Result<Self> {
        if !(lambda >= 0.0 && lambda.is_finite()) {
            return Err(TrainerError::Training(format!(
                "lambda must be non-negative, got {lambda}"
            )));
        }

        let counts = dataset.class_counts();
        if counts.iter().any(|&c| c == 0) {
            return Err(TrainerError::Training(
                "naive Bayes needs both classes in the training data".into(),
            ));
        }

        let d = dataset.feature_count();
        let mut means = [vec![0.0; d], vec![0.0; d]];
        for (row, &label) in dataset.features.iter().zip(&dataset.targets) {
            let class = label as usize;
            for (m, v) in means[class].iter_mut().zip(row) {
                *m += v / counts[class] as f64;
            }
        }

        let mut variances = [vec![0.0; d], vec![0.0; d]];
        for (row, &label) in dataset.features.iter().zip(&dataset.targets) {
            let class = label as usize;
            for j in 0..d {
                let diff = row[j] - means[class][j];
                variances[class][j] += diff * diff / counts[class] as f64;
            }
        }

        let max_variance = overall_variances(&dataset.features)
            .into_iter()
            .fold(0.0f64, f64::max);
        let epsilon = lambda * max_variance;
        for class_vars in &mut variances {
            for v in class_vars.iter_mut() {
                *v += epsilon;
            }
        }

        if variances.iter().flatten().any(|&v| v.is_nan() || v <= 0.0 || v.is_infinite()) {
            return Err(TrainerError::Training(
                "zero or non-finite feature variance after smoothing".into(),
            ));
        }

        let n = dataset.len() as f64;
        Ok(Self {
            log_priors: [
                (counts[0] as f64 / n).ln(),
                (counts[1] as f64 / n).ln(),
            ],
            means,
            variances,
        })
    }

    fn joint_log_likelihood(&self, row: &[f64], class: usize) -> f64 {
        let mut total = self.log_priors[class];
        for ((x, m), v) in row.iter().zip(&self.means[class]).zip(&self.variances[class]) {
            total -= 0.5 * (2.0 * std::f64::consts::PI * v).ln();
            total -= (x - m) * (x - m) / (2.0 * v);
        }
        total
    }

    fn probability(&self, row: &[f64]) -> f64 {
        let neg = self.joint_log_likelihood(row, 0);
        let pos = self.joint_log_likelihood(row, 1);
        // Logistic of the log-likelihood ratio.
        1.0 / (1.0 + (neg - pos).exp())
    }
}

impl ProbabilisticClassifier for NaiveBayesClassifier {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.probability(r)).collect()
    }
}

fn overall_variances(rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows.len() as f64;
    let d = rows.first().map_or(0, Vec::len);
    let mut means = vec![0.0; d];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mut vars = vec![0.0; d];
    for row in rows {
        for j in 0..d {
            vars[j] += (row[j] - means[j]) * (row[j] - means[j]) / n;
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> Dataset {
        Dataset::new(
            vec!["b0".into()],
            vec![vec![0.0], vec![1.0], vec![2.0], vec![8.0], vec![9.0], vec![10.0]],
            vec![0, 0, 0, 1, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_separates_classes() {
        let nb = NaiveBayesClassifier::fit(&separable(), 1e-6).unwrap();
        let probs = nb.predict_proba(&[vec![1.0], vec![9.0], vec![5.0]]);
        assert!(probs[0] < 0.01);
        assert!(probs[1] > 0.99);
        assert!((probs[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_class_is_error() {
        let ds = Dataset::new(vec!["b0".into()], vec![vec![0.0], vec![1.0]], vec![0, 0]).unwrap();
        assert!(NaiveBayesClassifier::fit(&ds, 1e-3).is_err());
    }

    #[test]
    fn test_constant_feature_needs_smoothing() {
        let ds = Dataset::new(
            vec!["b0".into(), "b1".into()],
            vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![5.0, 1.0], vec![6.0, 1.0]],
            vec![0, 0, 1, 1],
        )
        .unwrap();
        assert!(NaiveBayesClassifier::fit(&ds, 0.0).is_err());
        assert!(NaiveBayesClassifier::fit(&ds, 1e-2).is_ok());
    }
}
