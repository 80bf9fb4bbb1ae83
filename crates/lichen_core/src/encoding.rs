//! One-hot encoding of categorical columns
//!
//! Numeric columns pass through in frame order, followed by the indicator
//! columns of each categorical column. Levels are sorted lexicographically
//! (byte order) so the output schema does not depend on row order; the first
//! level is the dropped reference level and the rest become `{column}_{level}`.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::errors::{CoreError, Result};
use crate::frame::{Cell, ColumnKind, Frame};

/// Column-ordered numeric matrix with original row positions
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    row_index: Vec<usize>,
}

impl EncodedMatrix {
    /// Build a matrix; every row must have one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>, row_index: Vec<usize>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        debug_assert_eq!(rows.len(), row_index.len());
        Self {
            columns,
            rows,
            row_index,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

/// Categorical-to-indicator encoder with first-level dropping
#[derive(Debug, Clone, Copy, Default)]
pub struct OneHotEncoder;

enum Plan<'a> {
    Numeric(usize),
    Indicators { col: usize, levels: Vec<&'a str> },
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode every column of `frame` except those named in `exclude`
    ///
    /// Missing numeric cells become `NaN`; missing categorical cells set no
    /// indicator.
    pub fn encode<S: AsRef<str>>(&self, frame: &Frame, exclude: &[S]) -> Result<EncodedMatrix> {
        let included = |name: &str| !exclude.iter().any(|e| e.as_ref() == name);

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for (col, (name, kind)) in frame.columns().iter().zip(frame.kinds()).enumerate() {
            if !included(name) {
                continue;
            }
            match kind {
                ColumnKind::Numeric => numeric.push(Plan::Numeric(col)),
                ColumnKind::Categorical => {
                    let levels: BTreeSet<&str> = frame
                        .rows()
                        .iter()
                        .filter_map(|row| row[col].as_text())
                        .collect();
                    let levels: Vec<&str> = levels.into_iter().skip(1).collect();
                    debug!("Column {} contributes {} indicator columns", name, levels.len());
                    categorical.push(Plan::Indicators { col, levels });
                }
            }
        }

        let plans: Vec<Plan<'_>> = numeric.into_iter().chain(categorical).collect();

        let mut columns = Vec::new();
        for plan in &plans {
            match plan {
                Plan::Numeric(col) => columns.push(frame.columns()[*col].clone()),
                Plan::Indicators { col, levels } => {
                    let base = &frame.columns()[*col];
                    columns.extend(levels.iter().map(|level| format!("{base}_{level}")));
                }
            }
        }

        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(CoreError::Data(format!(
                "encoded column '{dup}' collides with another column"
            )));
        }

        let rows = frame
            .rows()
            .iter()
            .map(|row| {
                let mut out = Vec::with_capacity(columns.len());
                for plan in &plans {
                    match plan {
                        Plan::Numeric(col) => {
                            out.push(row[*col].as_number().unwrap_or(f64::NAN));
                        }
                        Plan::Indicators { col, levels } => {
                            let value = match &row[*col] {
                                Cell::Text(s) => Some(s.as_str()),
                                _ => None,
                            };
                            out.extend(
                                levels
                                    .iter()
                                    .map(|level| if value == Some(*level) { 1.0 } else { 0.0 }),
                            );
                        }
                    }
                }
                out
            })
            .collect();

        Ok(EncodedMatrix::new(columns, rows, frame.row_index().to_vec()))
    }
}
