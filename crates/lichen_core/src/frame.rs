//! Tabular frame loading and row cleaning
//!
//! Reads a header + comma-separated file into typed cells. Column kinds are
//! inferred over the whole file: a column is numeric when every non-missing
//! cell parses as `f64`, categorical otherwise. Every row remembers its
//! position in the original file so predictions can be joined back later.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::errors::{CoreError, Result};

/// Cell spellings treated as missing values
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A",
];

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// In-memory table with typed cells and original row positions
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Vec<Cell>>,
    row_index: Vec<usize>,
}

fn is_missing_marker(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

impl Frame {
    /// Load a frame from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading CSV from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a frame from any reader producing CSV with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_owned).collect();

        let mut records = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_owned).collect());
        }

        Self::from_raw(headers, records)
    }

    /// Build a frame from raw string cells, inferring column kinds
    pub fn from_raw(columns: Vec<String>, records: Vec<Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(CoreError::Data(format!("duplicate column name '{name}'")));
            }
        }

        for (line, record) in records.iter().enumerate() {
            if record.len() != columns.len() {
                return Err(CoreError::Data(format!(
                    "row {}: expected {} fields, got {}",
                    line + 1,
                    columns.len(),
                    record.len()
                )));
            }
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|col| {
                let numeric = records
                    .iter()
                    .map(|record| record[col].as_str())
                    .filter(|raw| !is_missing_marker(raw))
                    .all(|raw| raw.parse::<f64>().is_ok());
                if numeric {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Categorical
                }
            })
            .collect();

        let rows: Vec<Vec<Cell>> = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(&kinds)
                    .map(|(raw, kind)| {
                        if is_missing_marker(&raw) {
                            return Cell::Missing;
                        }
                        match kind {
                            // Numeric kind guarantees the parse succeeds.
                            ColumnKind::Numeric => {
                                raw.parse::<f64>().map(Cell::Number).unwrap_or(Cell::Missing)
                            }
                            ColumnKind::Categorical => Cell::Text(raw),
                        }
                    })
                    .collect()
            })
            .collect();

        let row_index = (0..rows.len()).collect();

        Ok(Self {
            columns,
            kinds,
            rows,
            row_index,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Original file position of every retained row
    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of a column that must exist
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| CoreError::MissingColumn(name.to_owned()))
    }

    /// Rename columns present in `map`; absent keys are ignored
    pub fn rename_columns(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        for name in &mut self.columns {
            if let Some(renamed) = map.get(name.as_str()) {
                debug!("Renaming column {} -> {}", name, renamed);
                *name = renamed.clone();
            }
        }

        let mut seen = HashSet::new();
        for name in &self.columns {
            if !seen.insert(name.as_str()) {
                return Err(CoreError::Data(format!(
                    "renaming produced duplicate column '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// Remove the named columns; names not in the frame are ignored
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.iter().any(|n| n.as_ref() == c))
            .collect();

        if keep.iter().all(|&k| k) {
            return;
        }

        let mut retained = keep.iter();
        self.columns.retain(|_| *retained.next().unwrap_or(&true));
        let mut retained = keep.iter();
        self.kinds.retain(|_| *retained.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut retained = keep.iter();
            row.retain(|_| *retained.next().unwrap_or(&true));
        }
    }

    /// Keep only rows with no missing value outside the exempt columns
    pub fn drop_incomplete<S: AsRef<str>>(&self, exempt: &[S]) -> Frame {
        let checked: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !exempt.iter().any(|e| e.as_ref() == name.as_str()))
            .map(|(i, _)| i)
            .collect();

        let keep: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| checked.iter().all(|&c| !row[c].is_missing()))
            .map(|(i, _)| i)
            .collect();

        let dropped = self.rows.len() - keep.len();
        if dropped > 0 {
            debug!("Dropped {} of {} rows with missing values", dropped, self.rows.len());
        }

        self.select_rows(&keep)
    }

    /// New frame holding the rows at the given positions, in that order
    pub fn select_rows(&self, positions: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            kinds: self.kinds.clone(),
            rows: positions.iter().map(|&p| self.rows[p].clone()).collect(),
            row_index: positions.iter().map(|&p| self.row_index[p]).collect(),
        }
    }

    /// Extract a binary label column as 0/1 values
    pub fn labels(&self, name: &str) -> Result<Vec<u8>> {
        let col = self.require_column(name)?;

        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| match &row[col] {
                Cell::Number(v) if *v == 0.0 => Ok(0),
                Cell::Number(v) if *v == 1.0 => Ok(1),
                Cell::Missing => Err(CoreError::Data(format!(
                    "row {}: label '{}' is missing",
                    self.row_index[i] + 1,
                    name
                ))),
                other => Err(CoreError::Data(format!(
                    "row {}: label '{}' must be 0 or 1, got {:?}",
                    self.row_index[i] + 1,
                    name,
                    other
                ))),
            })
            .collect()
    }
}
