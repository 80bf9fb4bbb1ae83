//! Lichen presence classification core
//!
//! Shared building blocks for training and applying binary tree-ensemble
//! classifiers to tabular and satellite-embedding features.
//!
//! Modules:
//! - `frame`: CSV loading, typed cells and row cleaning
//! - `encoding`: one-hot encoding with first-level dropping
//! - `align`: reindexing encoded matrices onto a canonical schema
//! - `weights`: class-imbalance weighting
//! - `gbdt`: tree and ensemble model types with persistence
//! - `classifier`: common probability/class prediction interface
//! - `metrics`: error matrix and classification report
//! - `serde_canon`: canonical JSON and digests

pub mod align;
pub mod classifier;
pub mod encoding;
pub mod errors;
pub mod frame;
pub mod gbdt;
pub mod metrics;
pub mod serde_canon;
pub mod weights;

pub use align::{AlignMode, AlignReport, ColumnAligner};
pub use classifier::{class_for, ProbabilisticClassifier, DECISION_THRESHOLD};
pub use encoding::{EncodedMatrix, OneHotEncoder};
pub use errors::{CoreError, Result};
pub use frame::{Cell, ColumnKind, Frame};
pub use gbdt::{BoostLoss, ClassifierModel, Ensemble, ModelMetadata, Node, Tree};
pub use metrics::{accuracy, ClassMetrics, ClassificationReport, ErrorMatrix};
pub use weights::imbalance_weight;

/// Crate version string recorded in model metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
