//! Base probability estimators.
//!
//! The stacking ensemble consumes exactly five base estimators, one from each
//! algorithm family, in the fixed order given by [`CANONICAL_ORDER`]. Every
//! family implements [`ProbabilityEstimator`]; [`BaseEstimator`] is the
//! serializable sum type the ensemble artifact stores.

mod boosting;
mod linear;
mod neural;
mod tree;

pub use boosting::GradientBoosting;
pub use linear::LogisticRegression;
pub use neural::{DenseLayer, NeuralNetwork};
pub use tree::{DecisionTree, ExtraTrees, Forest, RandomForest, TreeNode};

use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use crate::sparse::SparseVector;

// ---------------------------------------------------------------------------
// Estimator kinds
// ---------------------------------------------------------------------------

/// Algorithm family of a base estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    LogisticRegression,
    NeuralNetwork,
    RandomForest,
    ExtraTrees,
    GradientBoosting,
}

impl EstimatorKind {
    /// Short identifier used in logs and order diagnostics.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::LogisticRegression => "lr",
            Self::NeuralNetwork => "nn",
            Self::RandomForest => "rf",
            Self::ExtraTrees => "et",
            Self::GradientBoosting => "gb",
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Order in which base probabilities are concatenated, at fit time and at
/// inference time alike.
pub const CANONICAL_ORDER: [EstimatorKind; 5] = [
    EstimatorKind::LogisticRegression,
    EstimatorKind::NeuralNetwork,
    EstimatorKind::RandomForest,
    EstimatorKind::ExtraTrees,
    EstimatorKind::GradientBoosting,
];

/// Render an order as `lr, nn, rf, et, gb`.
pub fn format_order(order: &[EstimatorKind]) -> String {
    order
        .iter()
        .map(|k| k.short_name())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// ProbabilityEstimator
// ---------------------------------------------------------------------------

/// A trained classifier that produces per-class probabilities.
pub trait ProbabilityEstimator: Send + Sync {
    /// Algorithm family.
    fn kind(&self) -> EstimatorKind;

    /// Input width the estimator was trained on.
    fn n_features(&self) -> usize;

    /// Number of probabilities returned by [`Self::predict_proba`].
    fn n_classes(&self) -> usize;

    /// Class probabilities for one encoded input, ordered by class index.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] when `x` does not have
    /// [`Self::n_features`] columns.
    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>>;
}

/// Reject inputs whose width differs from the trained width.
pub(crate) fn check_input(kind: EstimatorKind, expected: usize, x: &SparseVector) -> Result<()> {
    if x.dim() != expected {
        return Err(StackGuardError::shape_mismatch(
            format!("{} estimator input", kind.short_name()),
            expected,
            x.dim(),
        ));
    }
    Ok(())
}

/// Numerically stable softmax.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

// ---------------------------------------------------------------------------
// BaseEstimator
// ---------------------------------------------------------------------------

/// One of the five base estimator families, as stored in the ensemble
/// artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseEstimator {
    LogisticRegression(LogisticRegression),
    NeuralNetwork(NeuralNetwork),
    RandomForest(RandomForest),
    ExtraTrees(ExtraTrees),
    GradientBoosting(GradientBoosting),
}

impl BaseEstimator {
    fn as_estimator(&self) -> &dyn ProbabilityEstimator {
        match self {
            Self::LogisticRegression(m) => m,
            Self::NeuralNetwork(m) => m,
            Self::RandomForest(m) => m,
            Self::ExtraTrees(m) => m,
            Self::GradientBoosting(m) => m,
        }
    }

    /// Check the estimator's parameters for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] describing the first
    /// inconsistency found.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::LogisticRegression(m) => m.validate(),
            // Layer shapes are checked when the network is built.
            Self::NeuralNetwork(_) => Ok(()),
            Self::RandomForest(m) => m.validate(),
            Self::ExtraTrees(m) => m.validate(),
            Self::GradientBoosting(m) => m.validate(),
        }
    }
}

impl ProbabilityEstimator for BaseEstimator {
    fn kind(&self) -> EstimatorKind {
        self.as_estimator().kind()
    }

    fn n_features(&self) -> usize {
        self.as_estimator().n_features()
    }

    fn n_classes(&self) -> usize {
        self.as_estimator().n_classes()
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        self.as_estimator().predict_proba(x)
    }
}

impl From<LogisticRegression> for BaseEstimator {
    fn from(m: LogisticRegression) -> Self {
        Self::LogisticRegression(m)
    }
}

impl From<NeuralNetwork> for BaseEstimator {
    fn from(m: NeuralNetwork) -> Self {
        Self::NeuralNetwork(m)
    }
}

impl From<RandomForest> for BaseEstimator {
    fn from(m: RandomForest) -> Self {
        Self::RandomForest(m)
    }
}

impl From<ExtraTrees> for BaseEstimator {
    fn from(m: ExtraTrees) -> Self {
        Self::ExtraTrees(m)
    }
}

impl From<GradientBoosting> for BaseEstimator {
    fn from(m: GradientBoosting) -> Self {
        Self::GradientBoosting(m)
    }
}
