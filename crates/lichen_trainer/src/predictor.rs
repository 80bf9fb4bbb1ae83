//! Batch prediction with a persisted model
//!
//! Rows are cleaned, encoded and aligned onto the model's feature schema
//! before prediction. Results are joined back onto the raw input by row
//! index, so the output has exactly one row per input row and rows dropped
//! during cleaning get empty fields.

use std::collections::HashMap;
use std::path::Path;

use lichen_core::{class_for, AlignMode, AlignReport, ClassifierModel, ColumnAligner, Frame, OneHotEncoder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ColumnsConfig;
use crate::errors::{Result, TrainerError};

/// Output column holding the predicted class
pub const CLASS_COLUMN: &str = "predictedClass";
/// Output column holding the positive-class probability
pub const PROBABILITY_COLUMN: &str = "positiveClassProbability";

/// Prediction for one input row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: u8,
    pub probability: f64,
}

/// Predictions aligned with the raw input rows
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    /// One entry per input row; `None` where the row was dropped
    pub rows: Vec<Option<Prediction>>,
    pub alignment: AlignReport,
}

impl PredictionTable {
    pub fn predicted(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    pub fn dropped(&self) -> usize {
        self.rows.len() - self.predicted()
    }

    /// Write `predictedClass,positiveClassProbability` in input row order
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([CLASS_COLUMN, PROBABILITY_COLUMN])?;
        for row in &self.rows {
            match row {
                Some(p) => writer.write_record([p.class.to_string(), p.probability.to_string()])?,
                None => writer.write_record(["", ""])?,
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Applies a trained model to raw tables
pub struct Predictor {
    model: ClassifierModel,
    columns: ColumnsConfig,
    align_mode: AlignMode,
}

impl Predictor {
    pub fn new(model: ClassifierModel, columns: ColumnsConfig, align_mode: AlignMode) -> Self {
        Self {
            model,
            columns,
            align_mode,
        }
    }

    pub fn model(&self) -> &ClassifierModel {
        &self.model
    }

    /// Predict every row of a raw frame
    pub fn predict_frame(&self, raw: &Frame) -> Result<PredictionTable> {
        let mut frame = raw.clone();
        frame.rename_columns(&self.columns.rename)?;
        frame.drop_columns(&self.columns.drop);
        let cleaned = frame.drop_incomplete(&[self.columns.group.as_str()]);

        let mut rows = vec![None; raw.len()];
        if cleaned.is_empty() {
            warn!("No complete rows to predict among {} input rows", raw.len());
            return Ok(PredictionTable {
                rows,
                alignment: AlignReport::default(),
            });
        }

        let encoded = OneHotEncoder::new().encode(&cleaned, &self.columns.non_features())?;
        let aligner = ColumnAligner::new(self.model.feature_names.clone(), self.align_mode);
        let (aligned, alignment) = aligner.align(&encoded)?;

        // The input may itself be a filtered frame, so join on its row index.
        let positions: HashMap<usize, usize> = raw
            .row_index()
            .iter()
            .enumerate()
            .map(|(pos, &index)| (index, pos))
            .collect();

        for (row, index) in aligned.rows().iter().zip(aligned.row_index()) {
            let pos = positions.get(index).copied().ok_or_else(|| {
                TrainerError::Dataset(format!("row index {index} is not part of the input frame"))
            })?;
            let probability = self.model.probability(row);
            rows[pos] = Some(Prediction {
                class: class_for(probability),
                probability,
            });
        }

        let table = PredictionTable { rows, alignment };
        info!(
            "Predicted {} rows, {} dropped during cleaning",
            table.predicted(),
            table.dropped()
        );
        Ok(table)
    }

    /// Read `input`, predict and write the joined predictions to `output`
    pub fn predict_csv<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<PredictionTable> {
        let input = input.as_ref();
        let output = output.as_ref();
        info!("Reading input data from: {}", input.display());
        let raw = Frame::from_csv(input)?;

        let table = self.predict_frame(&raw)?;
        table.write_csv(output)?;
        info!("Predictions saved to {}", output.display());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lichen_core::{CoreError, Ensemble, Node, Tree};

    fn model() -> ClassifierModel {
        // Positive when standClass_C is set.
        let tree = Tree::new(
            vec![
                Node::internal(0, 2, 0.5, 1, 2),
                Node::leaf(1, 0.2),
                Node::leaf(2, 0.9),
            ],
            1.0,
        );
        ClassifierModel::new(
            vec!["slope".into(), "standClass_B".into(), "standClass_C".into()],
            Ensemble::Forest { trees: vec![tree] },
        )
    }

    fn frame(csv: &str) -> Frame {
        Frame::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_missing_level_is_zero_filled() {
        // Only A and C appear, so standClass_B is absent from the encoding.
        let raw = frame("slope,standClass,pixelGroup\n1.0,A,1\n2.0,C,1\n");
        let predictor = Predictor::new(model(), ColumnsConfig::default(), AlignMode::Lenient);
        let table = predictor.predict_frame(&raw).unwrap();

        assert_eq!(table.alignment.zero_filled, vec!["standClass_B"]);
        assert_eq!(
            table.rows,
            vec![
                Some(Prediction { class: 0, probability: 0.2 }),
                Some(Prediction { class: 1, probability: 0.9 }),
            ]
        );
    }

    #[test]
    fn test_dropped_rows_keep_their_place() {
        let raw = frame("slope,standClass,pixelGroup\n1.0,A,\n,B,2\n3.0,C,3\n");
        let predictor = Predictor::new(model(), ColumnsConfig::default(), AlignMode::Lenient);
        let table = predictor.predict_frame(&raw).unwrap();

        assert_eq!(table.rows.len(), 3);
        assert!(table.rows[0].is_some());
        assert!(table.rows[1].is_none());
        assert_eq!(table.rows[2].map(|p| p.class), Some(1));
        assert_eq!(table.dropped(), 1);
    }

    #[test]
    fn test_prefiltered_frame_joins_on_row_index() {
        let raw = frame("slope,standClass,pixelGroup\nNA,A,1\n1.0,B,2\n3.0,C,3\n");
        let filtered = raw.drop_incomplete(&["pixelGroup"]);
        assert_eq!(filtered.row_index(), &[1, 2]);

        let predictor = Predictor::new(model(), ColumnsConfig::default(), AlignMode::Lenient);
        let table = predictor.predict_frame(&filtered).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].map(|p| p.class), Some(0));
        assert_eq!(table.rows[1].map(|p| p.class), Some(1));
    }

    #[test]
    fn test_strict_mode_rejects_mismatch() {
        let raw = frame("slope,standClass\n1.0,A\n2.0,C\n");
        let predictor = Predictor::new(model(), ColumnsConfig::default(), AlignMode::Strict);
        assert!(matches!(
            predictor.predict_frame(&raw),
            Err(TrainerError::Core(CoreError::SchemaMismatch { .. }))
        ));
    }

    #[test]
    fn test_csv_output_has_empty_fields_for_dropped_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        let output = dir.path().join("output.csv");
        std::fs::write(&input, "slope,standClass\n1.0,C\nNA,A\n2.0,A\n").unwrap();

        let predictor = Predictor::new(model(), ColumnsConfig::default(), AlignMode::Lenient);
        predictor.predict_csv(&input, &output).unwrap();

        let contents = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            contents,
            "predictedClass,positiveClassProbability\n1,0.9\n,\n0,0.2\n"
        );
    }
}
