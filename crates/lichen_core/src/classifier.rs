//! Common interface for binary classifiers producing probabilities

/// Probability above which a row is assigned the positive class
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Class label for a positive-class probability
pub fn class_for(probability: f64) -> u8 {
    u8::from(probability > DECISION_THRESHOLD)
}

/// A fitted binary classifier
pub trait ProbabilisticClassifier: Send + Sync {
    /// Positive-class probability for every row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64>;

    /// Predicted class (0/1) for every row
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<u8> {
        self.predict_proba(rows).into_iter().map(class_for).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);

    impl ProbabilisticClassifier for Constant {
        fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
            vec![self.0; rows.len()]
        }
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(class_for(0.5), 0);
        assert_eq!(class_for(0.5000001), 1);
        assert_eq!(Constant(0.9).predict(&[vec![], vec![]]), vec![1, 1]);
    }
}
