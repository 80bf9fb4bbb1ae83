//! Decision tree structures shared by boosted and bagged ensembles
//!
//! Nodes live in a flat vector with node 0 as the root. Internal nodes send
//! a row left when `feature <= threshold`; a `NaN` feature goes right.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0` and `left`/`right` index child
/// nodes. Leaves carry `feature_idx == -1` and a `leaf` value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: i32,
    pub left: i32,
    pub right: i32,
    pub feature_idx: i32,
    pub threshold: f64,
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    pub fn leaf_value(&self) -> Option<f64> {
        self.leaf
    }
}

/// A single decision tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,

    /// Multiplier applied to the leaf value when aggregating
    pub weight: f64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: f64) -> Self {
        Self { nodes, weight }
    }

    /// Leaf value reached by `features`; malformed structure yields 0.0
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }

        let mut idx = 0usize;

        loop {
            if idx >= self.nodes.len() {
                return 0.0;
            }

            let node = &self.nodes[idx];

            if node.is_leaf() {
                return node.leaf_value().unwrap_or(0.0);
            }

            let feature_idx = node.feature_idx as usize;
            if feature_idx >= features.len() {
                return 0.0;
            }

            let next = if features[feature_idx] <= node.threshold {
                node.left
            } else {
                node.right
            };

            if next < 0 || next as usize >= self.nodes.len() {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Check child links, feature indices and leaf values
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    Some(v) => return Err(format!("Leaf node {i} has non-finite value {v}")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }

            if node.feature_idx < 0 || node.feature_idx as usize >= feature_count {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 1, 2),
                Node::leaf(1, 0.25),
                Node::leaf(2, 0.75),
            ],
            1.0,
        )
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 3, 1.5, 1, 2);
        assert!(!internal.is_leaf());
        assert_eq!(internal.feature_idx, 3);

        let leaf = Node::leaf(1, -0.5);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf_value(), Some(-0.5));
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30.0]), 0.25);
        assert_eq!(tree.evaluate(&[50.0]), 0.25);
        assert_eq!(tree.evaluate(&[60.0]), 0.75);
        assert_eq!(tree.evaluate(&[f64::NAN]), 0.75);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let bad_child = Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 5, 2),
                Node::leaf(1, 0.0),
                Node::leaf(2, 1.0),
            ],
            1.0,
        );
        assert!(bad_child.validate(1).is_err());

        let cycle = Tree::new(vec![Node::internal(0, 0, 1.0, 0, 0)], 1.0);
        assert!(cycle.validate(1).is_err());
    }

    #[test]
    fn test_leaf_count() {
        assert_eq!(stump().leaf_count(), 2);
    }
}
