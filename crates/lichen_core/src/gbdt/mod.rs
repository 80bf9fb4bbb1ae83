//! Tree-ensemble classifiers
//!
//! Boosted ensembles sum shrunken tree outputs on top of a base score and map
//! the total through their loss's link; forests average per-leaf
//! positive-class fractions. Both index rows by the canonical feature schema
//! carried in [`ClassifierModel::feature_names`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use lichen_core::gbdt::{ClassifierModel, Ensemble, Node, Tree};
//!
//! let tree = Tree::new(
//!     vec![
//!         Node::internal(0, 0, 12.5, 1, 2),
//!         Node::leaf(1, 0.2),
//!         Node::leaf(2, 0.9),
//!     ],
//!     1.0,
//! );
//! let model = ClassifierModel::new(vec!["slope".into()], Ensemble::Forest { trees: vec![tree] });
//! let digest = model.save_with_digest("bestModel.bin").unwrap();
//! let restored = ClassifierModel::load("bestModel.bin").unwrap();
//! assert_eq!(restored.probability(&[20.0]), 0.9);
//! # let _ = digest;
//! ```

pub mod model;
pub mod tree;

pub use model::{
    digest_path, BoostLoss, ClassifierModel, Ensemble, ModelMetadata, DIGEST_EXTENSION,
    FORMAT_VERSION,
};
pub use tree::{Node, Tree};
