//! k-nearest-neighbour classifier
//!
//! Exact brute-force neighbour search. The positive-class probability is the
//! fraction of positive labels among the `k` nearest training rows; distance
//! ties are broken by training row order.

use std::fmt;
use std::str::FromStr;

use lichen_core::ProbabilisticClassifier;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};

/// Pivot magnitude below which the covariance matrix is treated as singular
const SINGULAR_EPSILON: f64 = 1e-12;

/// Distance used to rank neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Mahalanobis,
}

/// Neighbour index structure requested for the search
///
/// All methods return the exact neighbours; the value is kept so runs
/// record the combination they were asked to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMethod {
    Auto,
    KdTree,
    CoverTree,
}

impl FromStr for DistanceMetric {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EUCLIDEAN" => Ok(DistanceMetric::Euclidean),
            "MANHATTAN" => Ok(DistanceMetric::Manhattan),
            "MAHALANOBIS" => Ok(DistanceMetric::Mahalanobis),
            _ => Err(TrainerError::Config(format!("unknown distance metric '{s}'"))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => f.write_str("EUCLIDEAN"),
            DistanceMetric::Manhattan => f.write_str("MANHATTAN"),
            DistanceMetric::Mahalanobis => f.write_str("MAHALANOBIS"),
        }
    }
}

/// Fitted k-nearest-neighbour classifier
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    metric: DistanceMetric,
    rows: Vec<Vec<f64>>,
    labels: Vec<u8>,
    inverse_covariance: Option<Vec<Vec<f64>>>,
}

impl KnnClassifier {
    pub fn fit(dataset: &Dataset, k: usize, metric: DistanceMetric) -> Result<Self> {
        if k == 0 {
            return Err(TrainerError::Training("k must be positive".into()));
        }
        if k > dataset.len() {
            return Err(TrainerError::Training(format!(
                "k = {k} exceeds the {} training rows",
                dataset.len()
            )));
        }
        if dataset
            .features
            .iter()
            .any(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(TrainerError::Training(
                "nearest-neighbour search requires finite features".into(),
            ));
        }

        let inverse_covariance = match metric {
            DistanceMetric::Mahalanobis => Some(invert(&covariance(&dataset.features))?),
            _ => None,
        };

        Ok(Self {
            k,
            metric,
            rows: dataset.features.clone(),
            labels: dataset.targets.clone(),
            inverse_covariance,
        })
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.metric {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Mahalanobis => {
                let inv = match &self.inverse_covariance {
                    Some(inv) => inv,
                    None => return f64::NAN,
                };
                let diff: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
                let mut total = 0.0;
                for (i, row) in inv.iter().enumerate() {
                    let projected: f64 = row.iter().zip(&diff).map(|(m, d)| m * d).sum();
                    total += diff[i] * projected;
                }
                total.max(0.0).sqrt()
            }
        }
    }

    fn probability(&self, query: &[f64]) -> f64 {
        let mut ranked: Vec<(f64, usize)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (self.distance(query, row), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let positives = ranked[..self.k]
            .iter()
            .filter(|(_, i)| self.labels[*i] == 1)
            .count();
        positives as f64 / self.k as f64
    }
}

impl ProbabilisticClassifier for KnnClassifier {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.probability(r)).collect()
    }
}

/// Sample covariance matrix of the rows
fn covariance(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    let d = rows.first().map_or(0, Vec::len);
    let mut means = vec![0.0; d];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v / n as f64;
        }
    }

    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    let mut cov = vec![vec![0.0; d]; d];
    for row in rows {
        for i in 0..d {
            let di = row[i] - means[i];
            for j in i..d {
                cov[i][j] += di * (row[j] - means[j]) / denom;
            }
        }
    }
    for i in 0..d {
        for j in 0..i {
            cov[i][j] = cov[j][i];
        }
    }
    cov
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let d = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..d)
        .map(|i| (0..d).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..d {
        let pivot = (col..d)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < SINGULAR_EPSILON {
            return Err(TrainerError::Training(
                "covariance matrix is singular; Mahalanobis distance is undefined".into(),
            ));
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..d {
            a[col][j] /= p;
            inv[col][j] /= p;
        }

        for row in 0..d {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..d {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Ok(inv)
}
