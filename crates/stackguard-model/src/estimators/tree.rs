//! Decision trees and the two tree-ensemble families.
//!
//! Trees are stored as flat node arrays with children always placed after
//! their parent, so evaluation is a bounded walk from the root. A split sends
//! `x[feature] <= threshold` to the left child.

use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use super::{check_input, EstimatorKind, ProbabilityEstimator};
use crate::sparse::SparseVector;

/// A node in a flattened decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Internal node.
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    /// Terminal node carrying class counts (classification) or a single
    /// regression output (boosting).
    Leaf { value: Vec<f32> },
}

/// A flattened decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TreeNode>", into = "Vec<TreeNode>")]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Build a tree, checking that it is non-empty and that every child index
    /// points forward within the node array.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] for an invalid layout.
    pub fn new(nodes: Vec<TreeNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(StackGuardError::MalformedModel(
                "decision tree has no nodes".to_string(),
            ));
        }
        for (index, node) in nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                for child in [*left, *right] {
                    if child <= index || child >= nodes.len() {
                        return Err(StackGuardError::MalformedModel(format!(
                            "tree node {index} has invalid child index {child}"
                        )));
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    /// A single-leaf tree.
    pub fn leaf(value: Vec<f32>) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    /// Leaf value reached by `x`.
    pub fn evaluate(&self, x: &SparseVector) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x.get(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    /// Check split features against the input width and leaf widths against
    /// the expected output width.
    pub(crate) fn validate(&self, n_features: usize, leaf_width: usize) -> Result<()> {
        for node in &self.nodes {
            match node {
                TreeNode::Split { feature, .. } if *feature >= n_features => {
                    return Err(StackGuardError::MalformedModel(format!(
                        "split on feature {feature} exceeds input width {n_features}"
                    )));
                }
                TreeNode::Leaf { value } if value.len() != leaf_width => {
                    return Err(StackGuardError::MalformedModel(format!(
                        "leaf has {} values, expected {leaf_width}",
                        value.len()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<TreeNode>> for DecisionTree {
    type Error = StackGuardError;

    fn try_from(nodes: Vec<TreeNode>) -> Result<Self> {
        Self::new(nodes)
    }
}

impl From<DecisionTree> for Vec<TreeNode> {
    fn from(tree: DecisionTree) -> Self {
        tree.nodes
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// Bagged classification trees whose probabilities are the mean of each
/// tree's normalised leaf class distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl Forest {
    /// Build a forest.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if there are no trees, a
    /// split addresses a missing feature, or a leaf has the wrong width or a
    /// negative count.
    pub fn new(n_features: usize, n_classes: usize, trees: Vec<DecisionTree>) -> Result<Self> {
        let forest = Self {
            n_features,
            n_classes,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(StackGuardError::MalformedModel(
                "forest has no trees".to_string(),
            ));
        }
        if self.n_classes < 2 {
            return Err(StackGuardError::MalformedModel(format!(
                "forest needs at least 2 classes, got {}",
                self.n_classes
            )));
        }
        for tree in &self.trees {
            tree.validate(self.n_features, self.n_classes)?;
            let negative = tree.nodes.iter().any(|node| match node {
                TreeNode::Leaf { value } => value.iter().any(|v| *v < 0.0),
                TreeNode::Split { .. } => false,
            });
            if negative {
                return Err(StackGuardError::MalformedModel(
                    "forest leaf has a negative class count".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn predict_proba(&self, kind: EstimatorKind, x: &SparseVector) -> Result<Vec<f32>> {
        check_input(kind, self.n_features, x)?;
        let mut proba = vec![0.0_f32; self.n_classes];
        for tree in &self.trees {
            let counts = tree.evaluate(x);
            let total: f32 = counts.iter().sum();
            for (p, c) in proba.iter_mut().zip(counts) {
                *p += if total > 0.0 {
                    c / total
                } else {
                    1.0 / self.n_classes as f32
                };
            }
        }
        let n_trees = self.trees.len() as f32;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }
}

/// Random forest classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomForest(pub Forest);

/// Extremely randomized trees classifier. Evaluated like a random forest;
/// the families differ only in how their trees were grown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraTrees(pub Forest);

impl RandomForest {
    pub(crate) fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

impl ExtraTrees {
    pub(crate) fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

impl ProbabilityEstimator for RandomForest {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::RandomForest
    }

    fn n_features(&self) -> usize {
        self.0.n_features
    }

    fn n_classes(&self) -> usize {
        self.0.n_classes
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        self.0.predict_proba(self.kind(), x)
    }
}

impl ProbabilityEstimator for ExtraTrees {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::ExtraTrees
    }

    fn n_features(&self) -> usize {
        self.0.n_features
    }

    fn n_classes(&self) -> usize {
        self.0.n_classes
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        self.0.predict_proba(self.kind(), x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x[0] <= 0.5 → [0, 1]; otherwise [3, 1].
    fn stump() -> DecisionTree {
        DecisionTree::new(vec![
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 2,
            },
            TreeNode::Leaf {
                value: vec![0.0, 1.0],
            },
            TreeNode::Leaf {
                value: vec![3.0, 1.0],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_tree_routes_on_threshold() {
        let tree = stump();
        assert_eq!(tree.evaluate(&SparseVector::from_dense(&[0.5, 0.0])), &[0.0, 1.0]);
        assert_eq!(tree.evaluate(&SparseVector::from_dense(&[0.9, 0.0])), &[3.0, 1.0]);
    }

    #[test]
    fn test_tree_rejects_backward_child() {
        let err = DecisionTree::new(vec![TreeNode::Split {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
        }])
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_model");
    }

    #[test]
    fn test_tree_rejects_empty() {
        assert!(DecisionTree::new(Vec::new()).is_err());
    }

    #[test]
    fn test_tree_json_is_node_array() {
        let json = serde_json::to_value(stump()).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["type"], "split");
        let bad = serde_json::json!([{"type": "split", "feature": 0, "threshold": 0.0, "left": 5, "right": 6}]);
        assert!(serde_json::from_value::<DecisionTree>(bad).is_err());
    }

    #[test]
    fn test_forest_averages_normalised_leaves() {
        let forest = RandomForest(
            Forest::new(2, 2, vec![stump(), DecisionTree::leaf(vec![1.0, 1.0])]).unwrap(),
        );
        let p = forest
            .predict_proba(&SparseVector::from_dense(&[1.0, 0.0]))
            .unwrap();
        // (0.75 + 0.5) / 2, (0.25 + 0.5) / 2
        assert!((p[0] - 0.625).abs() < 1e-6);
        assert!((p[1] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_forest_rejects_inconsistent_trees() {
        // stump splits on feature 0 and has two-class leaves
        assert!(Forest::new(1, 2, vec![stump()]).is_ok());
        assert!(Forest::new(0, 2, vec![stump()]).is_err());
        assert!(Forest::new(1, 3, vec![stump()]).is_err());
        assert!(Forest::new(1, 2, Vec::new()).is_err());
    }

    #[test]
    fn test_forest_rejects_negative_counts() {
        assert!(Forest::new(1, 2, vec![DecisionTree::leaf(vec![-1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_extra_trees_kind_and_width_check() {
        let et = ExtraTrees(Forest::new(2, 2, vec![stump()]).unwrap());
        assert_eq!(et.kind(), EstimatorKind::ExtraTrees);
        let err = et.predict_proba(&SparseVector::zeros(3)).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
    }
}
