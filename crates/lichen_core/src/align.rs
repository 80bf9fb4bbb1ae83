//! Reindexing encoded matrices onto a canonical feature schema
//!
//! One-hot output depends on the levels present in each input, so inference
//! and held-out matrices rarely match the training columns exactly. The
//! aligner reorders to the schema, zero-fills schema columns the input lacks
//! and drops columns the schema does not know.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::encoding::EncodedMatrix;
use crate::errors::{CoreError, Result};

/// How schema mismatches are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    /// Zero-fill and drop, logging a warning
    #[default]
    Lenient,
    /// Reject any mismatch
    Strict,
}

impl FromStr for AlignMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(AlignMode::Lenient),
            "strict" => Ok(AlignMode::Strict),
            other => Err(CoreError::Config(format!("unknown align mode '{other}'"))),
        }
    }
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignMode::Lenient => f.write_str("lenient"),
            AlignMode::Strict => f.write_str("strict"),
        }
    }
}

/// Columns that were synthesized or discarded during alignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignReport {
    pub zero_filled: Vec<String>,
    pub dropped: Vec<String>,
}

impl AlignReport {
    pub fn is_exact(&self) -> bool {
        self.zero_filled.is_empty() && self.dropped.is_empty()
    }
}

/// Aligns matrices to a fixed ordered column list
#[derive(Debug, Clone)]
pub struct ColumnAligner {
    schema: Vec<String>,
    mode: AlignMode,
}

impl ColumnAligner {
    pub fn new(schema: Vec<String>, mode: AlignMode) -> Self {
        Self { schema, mode }
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn mode(&self) -> AlignMode {
        self.mode
    }

    /// Reindex `matrix` onto the schema
    ///
    /// In lenient mode this never fails.
    pub fn align(&self, matrix: &EncodedMatrix) -> Result<(EncodedMatrix, AlignReport)> {
        let positions: HashMap<&str, usize> = matrix
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let sources: Vec<Option<usize>> = self
            .schema
            .iter()
            .map(|c| positions.get(c.as_str()).copied())
            .collect();

        let report = AlignReport {
            zero_filled: self
                .schema
                .iter()
                .zip(&sources)
                .filter(|(_, src)| src.is_none())
                .map(|(c, _)| c.clone())
                .collect(),
            dropped: matrix
                .columns()
                .iter()
                .filter(|c| !self.schema.contains(c))
                .cloned()
                .collect(),
        };

        if !report.is_exact() {
            match self.mode {
                AlignMode::Strict => {
                    return Err(CoreError::SchemaMismatch {
                        missing: report.zero_filled,
                        unexpected: report.dropped,
                    });
                }
                AlignMode::Lenient => {
                    warn!(
                        zero_filled = ?report.zero_filled,
                        dropped = ?report.dropped,
                        "Input columns differ from the model schema; realigning"
                    );
                }
            }
        }

        let rows = matrix
            .rows()
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map_or(0.0, |i| row[i]))
                    .collect()
            })
            .collect();

        Ok((
            EncodedMatrix::new(self.schema.clone(), rows, matrix.row_index().to_vec()),
            report,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> EncodedMatrix {
        EncodedMatrix::new(
            vec!["slope".into(), "standClass_C".into(), "extra".into()],
            vec![vec![1.0, 1.0, 9.0], vec![2.0, 0.0, 9.0]],
            vec![0, 1],
        )
    }

    fn schema() -> Vec<String> {
        vec!["slope".into(), "standClass_B".into(), "standClass_C".into()]
    }

    #[test]
    fn test_lenient_fills_and_drops() {
        let aligner = ColumnAligner::new(schema(), AlignMode::Lenient);
        let (aligned, report) = aligner.align(&matrix()).unwrap();

        assert_eq!(aligned.columns(), schema().as_slice());
        assert_eq!(aligned.rows()[0], vec![1.0, 0.0, 1.0]);
        assert_eq!(aligned.rows()[1], vec![2.0, 0.0, 0.0]);
        assert_eq!(report.zero_filled, vec!["standClass_B".to_string()]);
        assert_eq!(report.dropped, vec!["extra".to_string()]);
    }

    #[test]
    fn test_strict_rejects_mismatch() {
        let aligner = ColumnAligner::new(schema(), AlignMode::Strict);
        match aligner.align(&matrix()) {
            Err(CoreError::SchemaMismatch { missing, unexpected }) => {
                assert_eq!(missing, vec!["standClass_B".to_string()]);
                assert_eq!(unexpected, vec!["extra".to_string()]);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_accepts_reordered_exact_columns() {
        let m = EncodedMatrix::new(
            vec!["standClass_C".into(), "slope".into(), "standClass_B".into()],
            vec![vec![1.0, 3.0, 0.0]],
            vec![0],
        );
        let (aligned, report) = ColumnAligner::new(schema(), AlignMode::Strict)
            .align(&m)
            .unwrap();
        assert!(report.is_exact());
        assert_eq!(aligned.rows()[0], vec![3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_disjoint_schema_is_all_zero() {
        let m = EncodedMatrix::new(vec!["other".into()], vec![vec![5.0]], vec![0]);
        let (aligned, _) = ColumnAligner::new(schema(), AlignMode::Lenient)
            .align(&m)
            .unwrap();
        assert_eq!(aligned.rows()[0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("STRICT".parse::<AlignMode>().unwrap(), AlignMode::Strict);
        assert!("loose".parse::<AlignMode>().is_err());
    }
}
