//! Persisted tree-ensemble classifier
//!
//! A `ClassifierModel` pairs the ensemble with the canonical feature schema
//! it was trained against. The on-disk form is a bincode blob; a blake3
//! digest of the blob can be stored next to it and is checked on load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::tree::Tree;
use crate::classifier::ProbabilisticClassifier;
use crate::errors::{CoreError, Result};
use crate::serde_canon::to_canonical_json;

/// Current model blob layout
pub const FORMAT_VERSION: u32 = 1;

/// Extension appended to the model path for the digest sidecar
pub const DIGEST_EXTENSION: &str = "blake3";

/// Loss optimised by a boosted ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoostLoss {
    /// Binary log-loss; outputs pass through a sigmoid
    Logistic,
    /// Absolute error on the 0/1 label; outputs are clamped to [0, 1]
    LeastAbsoluteDeviation,
    /// Huber error on the 0/1 label; outputs are clamped to [0, 1]
    Huber,
}

impl BoostLoss {
    /// Map a raw ensemble output to a positive-class probability
    pub fn probability(self, raw: f64) -> f64 {
        match self {
            BoostLoss::Logistic => 1.0 / (1.0 + (-raw).exp()),
            BoostLoss::LeastAbsoluteDeviation | BoostLoss::Huber => raw.clamp(0.0, 1.0),
        }
    }
}

/// Tree ensemble variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ensemble {
    /// Additive trees on top of a base score; each tree's weight is its
    /// shrinkage
    Boosted {
        base_score: f64,
        loss: BoostLoss,
        trees: Vec<Tree>,
    },
    /// Averaged trees whose leaves hold positive-class fractions
    Forest { trees: Vec<Tree> },
}

impl Ensemble {
    pub fn trees(&self) -> &[Tree] {
        match self {
            Ensemble::Boosted { trees, .. } | Ensemble::Forest { trees } => trees,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Ensemble::Boosted { .. } => "boosted",
            Ensemble::Forest { .. } => "forest",
        }
    }
}

/// Provenance recorded alongside the trees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Unix timestamp (seconds) of the training run
    pub created_at: i64,
    pub trainer_version: String,
    /// Hyperparameters of the fitted estimator, rendered as strings
    pub params: BTreeMap<String, String>,
    pub imbalance_weight: Option<f64>,
    pub cv_score: Option<f64>,
    pub holdout_accuracy: Option<f64>,
}

/// Trained classifier with its canonical feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub format_version: u32,

    /// Ordered encoded column names the trees index into
    pub feature_names: Vec<String>,

    pub ensemble: Ensemble,

    pub metadata: ModelMetadata,
}

impl ClassifierModel {
    pub fn new(feature_names: Vec<String>, ensemble: Ensemble) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            feature_names,
            ensemble,
            metadata: ModelMetadata {
                created_at: chrono::Utc::now().timestamp(),
                trainer_version: crate::VERSION.to_string(),
                ..ModelMetadata::default()
            },
        }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn num_trees(&self) -> usize {
        self.ensemble.trees().len()
    }

    /// Validate version, schema and tree structure
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(CoreError::InvalidModel(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name) {
                return Err(CoreError::InvalidModel(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }

        if let Ensemble::Boosted { base_score, .. } = &self.ensemble {
            if !base_score.is_finite() {
                return Err(CoreError::InvalidModel("non-finite base score".into()));
            }
        }

        for (i, tree) in self.ensemble.trees().iter().enumerate() {
            tree.validate(self.feature_names.len()).map_err(|e| {
                CoreError::InvalidModel(format!("tree {i} validation failed: {e}"))
            })?;
        }

        Ok(())
    }

    /// Positive-class probability for one aligned feature row
    pub fn probability(&self, features: &[f64]) -> f64 {
        match &self.ensemble {
            Ensemble::Boosted {
                base_score,
                loss,
                trees,
            } => {
                let raw = trees
                    .iter()
                    .fold(*base_score, |acc, t| acc + t.weight * t.evaluate(features));
                loss.probability(raw)
            }
            Ensemble::Forest { trees } => {
                if trees.is_empty() {
                    return 0.0;
                }
                let sum: f64 = trees.iter().map(|t| t.evaluate(features)).sum();
                sum / trees.len() as f64
            }
        }
    }

    /// Serialize to the bincode blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize and validate a bincode blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: ClassifierModel = bincode::deserialize(bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Blake3 digest of the blob, hex encoded
    pub fn digest_hex(&self) -> Result<String> {
        let bytes = self.to_bytes()?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    /// Validate and write the blob to `path`, returning its digest
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        self.validate()?;
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        let digest = hex::encode(blake3::hash(&bytes).as_bytes());
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(digest)
    }

    /// Write the blob and its digest sidecar, returning the digest
    pub fn save_with_digest<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let digest = self.save(path)?;
        fs::write(digest_path(path), &digest)?;
        Ok(digest)
    }

    /// Read a model blob, verifying the digest sidecar when present
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let sidecar = digest_path(path);
        if sidecar.exists() {
            let expected = fs::read_to_string(&sidecar)?.trim().to_owned();
            let computed = hex::encode(blake3::hash(&bytes).as_bytes());
            if expected != computed {
                return Err(CoreError::DigestMismatch { expected, computed });
            }
            debug!("Digest verified for {}", path.display());
        }

        let model = Self::from_bytes(&bytes)?;
        info!(
            "Loaded {} model with {} trees over {} features",
            model.ensemble.family(),
            model.num_trees(),
            model.feature_names.len()
        );
        Ok(model)
    }

    /// Canonical JSON rendering of the whole model
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }
}

impl ProbabilisticClassifier for ClassifierModel {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.probability(r)).collect()
    }
}

/// Location of the digest sidecar for a model path
pub fn digest_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(DIGEST_EXTENSION);
    PathBuf::from(name)
}
