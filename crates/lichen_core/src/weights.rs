//! Class-imbalance weighting

use crate::errors::{CoreError, Result};

/// Ratio of negative to positive labels, used to up-weight the positive class
///
/// A split without any positive example is a configuration error and is
/// reported rather than papered over.
pub fn imbalance_weight(labels: &[u8]) -> Result<f64> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.iter().filter(|&&l| l == 0).count();

    if positives == 0 {
        return Err(CoreError::DegenerateClass(format!(
            "no positive labels among {} training rows",
            labels.len()
        )));
    }

    Ok(negatives as f64 / positives as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let labels = [0, 0, 0, 1, 0, 0, 1];
        assert_eq!(imbalance_weight(&labels).unwrap(), 2.5);
    }

    #[test]
    fn test_balanced_is_one() {
        assert_eq!(imbalance_weight(&[0, 1, 1, 0]).unwrap(), 1.0);
    }

    #[test]
    fn test_no_positives_is_error() {
        assert!(matches!(
            imbalance_weight(&[0, 0, 0]),
            Err(CoreError::DegenerateClass(_))
        ));
    }

    #[test]
    fn test_all_positive_is_zero() {
        assert_eq!(imbalance_weight(&[1, 1]).unwrap(), 0.0);
    }
}
