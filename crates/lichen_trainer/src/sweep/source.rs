//! Feature sources for the sweep
//!
//! A `FeatureSource` returns labelled records (an id, numeric bands and a
//! 0/1 label) sampled inside a region and time window. `CsvFeatureSource`
//! serves records from a local table with optional coordinate and date
//! columns used for filtering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use lichen_core::{Cell, ColumnKind, Frame};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deterministic::unit_hash;
use crate::errors::{Result, TrainerError};

/// Axis-aligned bounding box in the source's coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Named study area; `bounds = None` covers every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub bounds: Option<BoundingBox>,
}

impl Region {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bounds: None,
        }
    }
}

/// Half-open date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Calendar year `[y-01-01, (y+1)-01-01)`
    pub fn year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| TrainerError::Config(format!("invalid year {year}")))?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| TrainerError::Config(format!("invalid year {}", year + 1)))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Labelled records with numeric bands
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub ids: Vec<String>,
    pub band_names: Vec<String>,
    pub bands: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Split record positions into `(train, test)` per class
    ///
    /// Each record gets a uniform value from its id and the seed; values
    /// below `train_fraction` go to training.
    pub fn partition(&self, seed: u64, train_fraction: f64) -> (Vec<usize>, Vec<usize>) {
        let mut train = Vec::new();
        let mut test = Vec::new();
        for class in [1u8, 0u8] {
            for (i, id) in self.ids.iter().enumerate() {
                if self.labels[i] != class {
                    continue;
                }
                if unit_hash(id, seed) < train_fraction {
                    train.push(i);
                } else {
                    test.push(i);
                }
            }
        }
        train.sort_unstable();
        test.sort_unstable();
        (train, test)
    }
}

/// Provider of labelled feature samples
pub trait FeatureSource {
    fn sample(&self, region: &Region, window: &TimeWindow) -> Result<FeatureTable>;
}

/// Column roles for a CSV-backed source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceColumns {
    /// Record identifier; row numbers are used when absent from the file
    pub id: String,
    pub label: String,
    /// ISO date (`YYYY-MM-DD`) or year; no time filtering when absent
    pub date: String,
    /// Coordinates used for region filtering, excluded from bands
    pub x: String,
    pub y: String,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            label: "presenceCaribouLichen".into(),
            date: "date".into(),
            x: "x".into(),
            y: "y".into(),
        }
    }
}

/// Feature source backed by a local CSV file
#[derive(Debug, Clone)]
pub struct CsvFeatureSource {
    path: PathBuf,
    columns: SourceColumns,
}

impl CsvFeatureSource {
    pub fn new<P: AsRef<Path>>(path: P, columns: SourceColumns) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns,
        }
    }

    fn record_date(cell: &Cell) -> Option<NaiveDate> {
        match cell {
            Cell::Number(year) if year.fract() == 0.0 => NaiveDate::from_ymd_opt(*year as i32, 7, 1),
            Cell::Text(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FeatureSource for CsvFeatureSource {
    fn sample(&self, region: &Region, window: &TimeWindow) -> Result<FeatureTable> {
        info!(
            "Sampling {} for region {} in {}",
            self.path.display(),
            region.name,
            window.start.year()
        );

        let frame = Frame::from_csv(&self.path)?;
        let label_col = frame.require_column(&self.columns.label)?;
        let id_col = frame.column_index(&self.columns.id);
        let date_col = frame.column_index(&self.columns.date);
        let xy_cols = match (frame.column_index(&self.columns.x), frame.column_index(&self.columns.y)) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        let reserved: HashSet<usize> = [Some(label_col), id_col, date_col]
            .into_iter()
            .flatten()
            .chain(xy_cols.into_iter().flat_map(|(x, y)| [x, y]))
            .collect();

        let band_cols: Vec<usize> = (0..frame.columns().len())
            .filter(|c| !reserved.contains(c) && frame.kinds()[*c] == ColumnKind::Numeric)
            .collect();
        if band_cols.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "{} has no numeric band columns",
                self.path.display()
            )));
        }

        let mut table = FeatureTable {
            ids: Vec::new(),
            band_names: band_cols.iter().map(|&c| frame.columns()[c].clone()).collect(),
            bands: Vec::new(),
            labels: Vec::new(),
        };

        let mut skipped = 0usize;
        let mut unlabelled = 0usize;
        for (pos, row) in frame.rows().iter().enumerate() {
            if let Some(d) = date_col {
                match Self::record_date(&row[d]) {
                    Some(date) if window.contains(date) => {}
                    _ => continue,
                }
            }
            if let (Some(bounds), Some((x, y))) = (region.bounds, xy_cols) {
                match (row[x].as_number(), row[y].as_number()) {
                    (Some(x), Some(y)) if bounds.contains(x, y) => {}
                    _ => continue,
                }
            }

            let label = match row[label_col] {
                Cell::Number(v) if v == 0.0 => 0,
                Cell::Number(v) if v == 1.0 => 1,
                Cell::Missing => {
                    unlabelled += 1;
                    continue;
                }
                ref other => {
                    return Err(TrainerError::Dataset(format!(
                        "row {}: label '{}' must be 0 or 1, got {:?}",
                        frame.row_index()[pos] + 1,
                        self.columns.label,
                        other
                    )));
                }
            };

            let values: Option<Vec<f64>> = band_cols.iter().map(|&c| row[c].as_number()).collect();
            let values = match values {
                Some(v) => v,
                None => {
                    skipped += 1;
                    continue;
                }
            };

            let id = match id_col.map(|c| &row[c]) {
                Some(Cell::Text(t)) => t.clone(),
                Some(Cell::Number(n)) => n.to_string(),
                _ => format!("row{}", frame.row_index()[pos]),
            };

            table.ids.push(id);
            table.bands.push(values);
            table.labels.push(label);
        }

        if skipped > 0 {
            debug!("Skipped {} records with missing band values", skipped);
        }
        if unlabelled > 0 {
            debug!("Skipped {} records without a label", unlabelled);
        }
        info!(
            "Sampled {} records with {} bands",
            table.len(),
            table.band_names.len()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_year_window() {
        let window = TimeWindow::year(2024).unwrap();
        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
    }

    #[test]
    fn test_csv_source_filters_window_and_region() {
        let file = write_csv(
            "id,date,x,y,A00,A01,presenceCaribouLichen\n\
             a,2024-03-01,1.0,1.0,0.1,0.2,1\n\
             b,2023-03-01,1.0,1.0,0.3,0.4,0\n\
             c,2024-06-01,9.0,9.0,0.5,0.6,0\n\
             d,2024-07-01,2.0,2.0,,0.8,1\n\
             e,2024-08-01,2.0,2.0,0.9,1.0,0\n",
        );
        let source = CsvFeatureSource::new(file.path(), SourceColumns::default());
        let region = Region {
            name: "test".into(),
            bounds: Some(BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 5.0,
                max_y: 5.0,
            }),
        };

        let table = source.sample(&region, &TimeWindow::year(2024).unwrap()).unwrap();

        assert_eq!(table.band_names, vec!["A00", "A01"]);
        assert_eq!(table.ids, vec!["a", "e"]);
        assert_eq!(table.bands, vec![vec![0.1, 0.2], vec![0.9, 1.0]]);
        assert_eq!(table.labels, vec![1, 0]);
    }

    #[test]
    fn test_unlabelled_records_are_skipped_after_filtering() {
        let file = write_csv(
            "id,date,A00,presenceCaribouLichen\n\
             a,2024-03-01,0.1,1\n\
             b,2024-04-01,0.2,0\n\
             c,2019-01-01,0.3,\n\
             d,2024-05-01,0.4,\n",
        );
        let source = CsvFeatureSource::new(file.path(), SourceColumns::default());
        let table = source
            .sample(&Region::named("test"), &TimeWindow::year(2024).unwrap())
            .unwrap();

        assert_eq!(table.ids, vec!["a", "b"]);
        assert_eq!(table.labels, vec![1, 0]);
    }

    #[test]
    fn test_non_binary_label_in_window_is_error() {
        let file = write_csv("id,date,A00,presenceCaribouLichen\na,2024-03-01,0.1,2\n");
        let source = CsvFeatureSource::new(file.path(), SourceColumns::default());
        let result = source.sample(&Region::named("test"), &TimeWindow::year(2024).unwrap());
        assert!(matches!(result, Err(TrainerError::Dataset(_))));
    }

    #[test]
    fn test_partition_is_seeded_and_complete() {
        let table = FeatureTable {
            ids: (0..200).map(|i| format!("p{i}")).collect(),
            band_names: vec!["A00".into()],
            bands: vec![vec![0.0]; 200],
            labels: (0..200).map(|i| (i % 2) as u8).collect(),
        };

        let (train, test) = table.partition(42, 0.8);
        assert_eq!(train.len() + test.len(), 200);
        assert_eq!((train.clone(), test.clone()), table.partition(42, 0.8));
        assert!(train.len() > 120 && train.len() < 190);
    }
}
