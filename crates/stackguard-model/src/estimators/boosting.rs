//! Gradient-boosted regression trees for multi-class classification.
//!
//! Each boosting stage holds one regression tree per class. The raw score of
//! class `k` is `init[k] + learning_rate * Σ stage[k](x)`, and probabilities
//! are the softmax of the raw scores.

use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use super::tree::DecisionTree;
use super::{check_input, softmax, EstimatorKind, ProbabilityEstimator};
use crate::sparse::SparseVector;

/// Gradient boosting classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_features: usize,
    learning_rate: f32,
    /// Prior raw score per class.
    init: Vec<f32>,
    /// `stages[m][k]` is the regression tree for class `k` at stage `m`.
    stages: Vec<Vec<DecisionTree>>,
}

impl GradientBoosting {
    /// Build a boosted model.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if a stage does not hold
    /// one single-output tree per class or the learning rate is not positive.
    pub fn new(
        n_features: usize,
        learning_rate: f32,
        init: Vec<f32>,
        stages: Vec<Vec<DecisionTree>>,
    ) -> Result<Self> {
        let model = Self {
            n_features,
            learning_rate,
            init,
            stages,
        };
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.init.len() < 2 {
            return Err(StackGuardError::MalformedModel(format!(
                "gradient boosting needs at least 2 classes, got {}",
                self.init.len()
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(StackGuardError::MalformedModel(format!(
                "gradient boosting learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (m, stage) in self.stages.iter().enumerate() {
            if stage.len() != self.init.len() {
                return Err(StackGuardError::MalformedModel(format!(
                    "boosting stage {m} has {} trees, expected {}",
                    stage.len(),
                    self.init.len()
                )));
            }
            for tree in stage {
                tree.validate(self.n_features, 1)?;
            }
        }
        Ok(())
    }
}

impl ProbabilityEstimator for GradientBoosting {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::GradientBoosting
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.init.len()
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        check_input(self.kind(), self.n_features, x)?;
        let mut raw = self.init.clone();
        for stage in &self.stages {
            for (score, tree) in raw.iter_mut().zip(stage) {
                *score += self.learning_rate * tree.evaluate(x).first().copied().unwrap_or(0.0);
            }
        }
        Ok(softmax(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::TreeNode;

    fn indicator(feature: usize, low: f32, high: f32) -> DecisionTree {
        DecisionTree::new(vec![
            TreeNode::Split {
                feature,
                threshold: 0.0,
                left: 1,
                right: 2,
            },
            TreeNode::Leaf { value: vec![low] },
            TreeNode::Leaf { value: vec![high] },
        ])
        .unwrap()
    }

    fn model() -> GradientBoosting {
        GradientBoosting::new(
            2,
            0.5,
            vec![0.0, 0.0],
            vec![
                vec![indicator(0, -1.0, 2.0), indicator(0, 1.0, -2.0)],
                vec![indicator(1, 0.0, 0.0), indicator(1, 0.0, 4.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_raw_scores_accumulate() {
        let m = model();
        let p = m.predict_proba(&SparseVector::from_dense(&[1.0, 0.0])).unwrap();
        // raw = [0.5 * 2.0, 0.5 * -2.0] = [1, -1]
        let expected = 1.0 / (1.0 + (-2.0_f32).exp());
        assert!((p[0] - expected).abs() < 1e-6);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_second_stage_can_flip_decision() {
        let p = model()
            .predict_proba(&SparseVector::from_dense(&[1.0, 1.0]))
            .unwrap();
        // raw = [1, -1 + 2] = [1, 1]
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_stages_returns_prior() {
        let m = GradientBoosting::new(3, 0.1, vec![0.0, (2.0_f32).ln()], Vec::new()).unwrap();
        let p = m.predict_proba(&SparseVector::zeros(3)).unwrap();
        assert!((p[1] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_stage_width_mismatch() {
        let err = GradientBoosting::new(2, 0.1, vec![0.0, 0.0], vec![vec![indicator(0, 0.0, 1.0)]])
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_model");
    }

    #[test]
    fn test_rejects_multi_output_leaves() {
        let tree = DecisionTree::leaf(vec![1.0, 2.0]);
        assert!(GradientBoosting::new(2, 0.1, vec![0.0, 0.0], vec![vec![tree.clone(), tree]]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        assert!(GradientBoosting::new(2, 0.0, vec![0.0, 0.0], Vec::new()).is_err());
    }
}
