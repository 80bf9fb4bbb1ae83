//! Binary classification metrics
//!
//! `ErrorMatrix` counts are indexed `[actual][predicted]`. Ratios with a zero
//! denominator are reported as 0.0.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fraction of predictions equal to the labels
pub fn accuracy(actual: &[u8], predicted: &[u8]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a == p)
        .count();
    correct as f64 / actual.len() as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Two-class confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ErrorMatrix {
    pub fn from_labels(actual: &[u8], predicted: &[u8]) -> Self {
        let mut counts = [[0usize; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted) {
            counts[(a & 1) as usize][(p & 1) as usize] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.counts[0][0] + self.counts[1][1], self.total())
    }

    /// Rows labelled `class`
    pub fn actual_total(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Rows predicted as `class`
    pub fn predicted_total(&self, class: usize) -> usize {
        self.counts[0][class] + self.counts[1][class]
    }

    /// Per-class recall: correct / actual, indexed by class
    pub fn producers_accuracy(&self) -> [f64; 2] {
        [0, 1].map(|c| ratio(self.counts[c][c], self.actual_total(c)))
    }

    /// Per-class precision: correct / predicted, indexed by class
    pub fn consumers_accuracy(&self) -> [f64; 2] {
        [0, 1].map(|c| ratio(self.counts[c][c], self.predicted_total(c)))
    }

    /// Cohen's kappa
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let observed = self.accuracy();
        let expected: f64 = (0..2)
            .map(|c| (self.actual_total(c) as f64 / n) * (self.predicted_total(c) as f64 / n))
            .sum();
        if (1.0 - expected).abs() < f64::EPSILON {
            return 0.0;
        }
        (observed - expected) / (1.0 - expected)
    }
}

/// Precision, recall, F1 and support for one class or average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class report in the usual precision/recall/F1 layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(actual: &[u8], predicted: &[u8]) -> Self {
        let matrix = ErrorMatrix::from_labels(actual, predicted);
        let precision = matrix.consumers_accuracy();
        let recall = matrix.producers_accuracy();

        let classes = [0, 1].map(|c| {
            let (p, r) = (precision[c], recall[c]);
            let f1 = if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) };
            ClassMetrics {
                precision: p,
                recall: r,
                f1,
                support: matrix.actual_total(c),
            }
        });

        let total = matrix.total();
        let mean = |f: fn(&ClassMetrics) -> f64| (f(&classes[0]) + f(&classes[1])) / 2.0;
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };

        Self {
            classes,
            accuracy: matrix.accuracy(),
            macro_avg: ClassMetrics {
                precision: mean(|m: &ClassMetrics| m.precision),
                recall: mean(|m: &ClassMetrics| m.recall),
                f1: mean(|m: &ClassMetrics| m.f1),
                support: total,
            },
            weighted_avg: ClassMetrics {
                precision: weighted(|m: &ClassMetrics| m.precision),
                recall: weighted(|m: &ClassMetrics| m.recall),
                f1: weighted(|m: &ClassMetrics| m.f1),
                support: total,
            },
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (class, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_matrix_counts() {
        let actual = [0, 0, 1, 1, 1];
        let predicted = [0, 1, 1, 1, 0];
        let m = ErrorMatrix::from_labels(&actual, &predicted);

        assert_eq!(m.counts, [[1, 1], [1, 2]]);
        assert!((m.accuracy() - 0.6).abs() < 1e-12);
        assert_eq!(m.producers_accuracy(), [0.5, 2.0 / 3.0]);
    }

    #[test]
    fn test_kappa_perfect_and_chance() {
        let perfect = ErrorMatrix::from_labels(&[0, 1, 0, 1], &[0, 1, 0, 1]);
        assert!((perfect.kappa() - 1.0).abs() < 1e-12);

        let chance = ErrorMatrix {
            counts: [[25, 25], [25, 25]],
        };
        assert!(chance.kappa().abs() < 1e-12);
    }

    #[test]
    fn test_report_values() {
        let actual = [0, 0, 0, 1, 1];
        let predicted = [0, 0, 1, 1, 1];
        let report = ClassificationReport::new(&actual, &predicted);

        assert!((report.classes[0].precision - 1.0).abs() < 1e-12);
        assert!((report.classes[0].recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.classes[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.classes[1].support, 2);
        assert!((report.accuracy - 0.8).abs() < 1e-12);

        let rendered = report.to_string();
        assert!(rendered.contains("weighted avg"));
        assert!(rendered.contains("precision"));
    }

    #[test]
    fn test_zero_division_is_zero() {
        let report = ClassificationReport::new(&[0, 0], &[0, 0]);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }

    #[test]
    fn test_accuracy_empty() {
        assert_eq!(accuracy(&[], &[]), 0.0);
        assert_eq!(accuracy(&[1, 0], &[1, 1]), 0.5);
    }
}
