//! Linear support vector machine used as the stacking meta-model.
//!
//! One-vs-rest: each class owns a weight row and a bias, and prediction is
//! the arg-max of the per-class decision values (lowest class index wins
//! ties). Fitting minimises `λ/2 ‖w‖² + mean(hinge)` with deterministic
//! full-batch sub-gradient descent, warm-starting from the current weights so
//! a previously trained model can be repurposed.

use serde::{Deserialize, Serialize};
use stackguard_core::{ClassLabel, Result, StackGuardError};

use crate::estimators::EstimatorKind;

/// Optimiser settings for [`LinearSvm::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmConfig {
    /// L2 regularisation strength.
    pub lambda: f32,
    /// Step size.
    pub learning_rate: f32,
    /// Full passes over the training rows.
    pub epochs: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            learning_rate: 0.1,
            epochs: 500,
        }
    }
}

/// One-vs-rest linear SVM over concatenated base probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    /// `classes × width` weights.
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    /// Base estimator order of the rows the model was last fitted on.
    /// Empty until the first fit.
    #[serde(default)]
    feature_order: Vec<EstimatorKind>,
    #[serde(default)]
    config: SvmConfig,
}

impl LinearSvm {
    /// An unfitted model with zero weights over `width` input columns.
    pub fn new(width: usize, config: SvmConfig) -> Self {
        Self {
            weights: vec![vec![0.0; width]; ClassLabel::COUNT],
            bias: vec![0.0; ClassLabel::COUNT],
            feature_order: Vec::new(),
            config,
        }
    }

    /// Rebuild a model from trained parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if the shapes disagree.
    pub fn from_parts(
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
        feature_order: Vec<EstimatorKind>,
        config: SvmConfig,
    ) -> Result<Self> {
        let model = Self {
            weights,
            bias,
            feature_order,
            config,
        };
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.weights.len() != ClassLabel::COUNT || self.bias.len() != ClassLabel::COUNT {
            return Err(StackGuardError::MalformedModel(format!(
                "meta-model must have {} weight rows and biases, got {} and {}",
                ClassLabel::COUNT,
                self.weights.len(),
                self.bias.len()
            )));
        }
        let width = self.input_width();
        if width == 0 || self.weights.iter().any(|row| row.len() != width) {
            return Err(StackGuardError::MalformedModel(
                "meta-model weight rows must share a non-zero width".to_string(),
            ));
        }
        Ok(())
    }

    /// Width of the concatenated rows the model accepts.
    pub fn input_width(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    /// Base order recorded at fit time.
    pub fn feature_order(&self) -> &[EstimatorKind] {
        &self.feature_order
    }

    /// Whether the model has been fitted at least once.
    pub fn is_fitted(&self) -> bool {
        !self.feature_order.is_empty()
    }

    /// Optimiser settings used by [`Self::fit`].
    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    fn check_width(&self, row: &[f32]) -> Result<()> {
        if row.len() != self.input_width() {
            return Err(StackGuardError::shape_mismatch(
                "meta-model input",
                self.input_width(),
                row.len(),
            ));
        }
        Ok(())
    }

    /// Per-class decision values for one row.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] if `row` is not
    /// [`Self::input_width`] wide.
    pub fn decision_function(&self, row: &[f32]) -> Result<Vec<f32>> {
        self.check_width(row)?;
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| dot(w, row) + b)
            .collect())
    }

    /// Predict the class of one concatenated row.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] on a width mismatch.
    pub fn predict(&self, row: &[f32]) -> Result<ClassLabel> {
        let scores = self.decision_function(row)?;
        let mut best = 0;
        for (k, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = k;
            }
        }
        ClassLabel::from_index(best).ok_or_else(|| {
            StackGuardError::MalformedModel(format!("meta-model produced class index {best}"))
        })
    }

    /// Fit on concatenated rows and record the base order they came from.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::InvalidInput`] for empty or misaligned
    /// inputs and [`StackGuardError::ShapeMismatch`] when a row is not
    /// [`Self::input_width`] wide.
    pub fn fit(
        &mut self,
        rows: &[Vec<f32>],
        labels: &[ClassLabel],
        order: &[EstimatorKind],
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(StackGuardError::InvalidInput(
                "cannot fit meta-model on zero rows".to_string(),
            ));
        }
        if rows.len() != labels.len() {
            return Err(StackGuardError::InvalidInput(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        for row in rows {
            self.check_width(row)?;
        }

        let n = rows.len() as f32;
        let SvmConfig {
            lambda,
            learning_rate,
            epochs,
        } = self.config;

        for (class, (w, b)) in self.weights.iter_mut().zip(self.bias.iter_mut()).enumerate() {
            let targets: Vec<f32> = labels
                .iter()
                .map(|l| if l.index() == class { 1.0 } else { -1.0 })
                .collect();

            for _ in 0..epochs {
                let mut grad_w: Vec<f32> = w.iter().map(|wi| lambda * wi).collect();
                let mut grad_b = 0.0_f32;
                for (row, y) in rows.iter().zip(&targets) {
                    if y * (dot(w, row) + *b) < 1.0 {
                        for (g, x) in grad_w.iter_mut().zip(row) {
                            *g -= y * x / n;
                        }
                        grad_b -= y / n;
                    }
                }
                for (wi, g) in w.iter_mut().zip(&grad_w) {
                    *wi -= learning_rate * g;
                }
                *b -= learning_rate * grad_b;
            }
        }

        self.feature_order = order.to_vec();
        tracing::info!(
            rows = rows.len(),
            width = self.input_width(),
            epochs,
            "Fitted meta-model"
        );
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
