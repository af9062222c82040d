//! Multinomial logistic regression.

use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use super::{check_input, softmax, EstimatorKind, ProbabilityEstimator};
use crate::sparse::SparseVector;

/// Linear model scored as `softmax(coef · x + intercept)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// One weight row per class, each `n_features` wide.
    coef: Vec<Vec<f32>>,
    /// One intercept per class.
    intercept: Vec<f32>,
}

impl LogisticRegression {
    /// Build a model from trained coefficients.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if the shapes disagree.
    pub fn new(coef: Vec<Vec<f32>>, intercept: Vec<f32>) -> Result<Self> {
        let model = Self { coef, intercept };
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.coef.len() < 2 {
            return Err(StackGuardError::MalformedModel(format!(
                "logistic regression needs at least 2 classes, got {}",
                self.coef.len()
            )));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(StackGuardError::MalformedModel(format!(
                "logistic regression has {} coefficient rows but {} intercepts",
                self.coef.len(),
                self.intercept.len()
            )));
        }
        let width = self.coef[0].len();
        if width == 0 || self.coef.iter().any(|row| row.len() != width) {
            return Err(StackGuardError::MalformedModel(
                "logistic regression coefficient rows must share a non-zero width".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProbabilityEstimator for LogisticRegression {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::LogisticRegression
    }

    fn n_features(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    fn n_classes(&self) -> usize {
        self.coef.len()
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        check_input(self.kind(), self.n_features(), x)?;
        let logits = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| x.dot(row).map(|d| d + b))
            .collect::<Result<Vec<f32>>>()?;
        Ok(softmax(&logits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LogisticRegression {
        LogisticRegression::new(
            vec![
                vec![4.0, 0.0, 0.0],
                vec![0.0, 4.0, 0.0],
                vec![0.0, 0.0, 0.0],
            ],
            vec![0.0, 0.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_predict_proba_favours_weighted_class() {
        let m = model();
        let p = m.predict_proba(&SparseVector::from_dense(&[1.0, 0.0, 0.0])).unwrap();
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[0] > p[1] && p[0] > p[2]);
    }

    #[test]
    fn test_zero_input_uses_intercept() {
        let p = model().predict_proba(&SparseVector::zeros(3)).unwrap();
        assert!(p[2] > p[0]);
        assert!((p[0] - p[1]).abs() < 1e-6);
    }

    #[test]
    fn test_width_mismatch() {
        let err = model().predict_proba(&SparseVector::zeros(4)).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
    }

    #[test]
    fn test_rejects_ragged_coefficients() {
        let err = LogisticRegression::new(vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 0.0])
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_model");
    }

    #[test]
    fn test_rejects_intercept_mismatch() {
        assert!(LogisticRegression::new(vec![vec![1.0], vec![1.0]], vec![0.0]).is_err());
    }
}
