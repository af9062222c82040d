//! Stacking ensemble.
//!
//! Five pre-fitted base estimators each produce a probability vector for an
//! encoded input. The vectors are concatenated in [`CANONICAL_ORDER`] and the
//! resulting row is classified by the [`LinearSvm`] meta-model.
//!
//! ```text
//! x ─┬─ LR ─┐
//!    ├─ NN ─┤
//!    ├─ RF ─┼─ concat (15) ─ LinearSvm ─ label
//!    ├─ ET ─┤
//!    └─ GB ─┘
//! ```
//!
//! The meta-model learns weights for each block position, so the order is
//! checked when the ensemble is built and again against the order the
//! meta-model recorded when it was fitted.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stackguard_core::{ClassLabel, Result, StackGuardError};

use crate::artifact::{self, FORMAT_VERSION};
use crate::estimators::{
    format_order, BaseEstimator, EstimatorKind, ProbabilityEstimator, CANONICAL_ORDER,
};
use crate::evaluation::{ClassificationReport, Evaluation};
use crate::meta::LinearSvm;
use crate::sparse::SparseVector;

/// Serialized form of a trained ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnsembleArtifact {
    format_version: u32,
    bases: Vec<BaseEstimator>,
    meta: LinearSvm,
}

/// Five base estimators plus the meta-model that combines them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EnsembleArtifact", into = "EnsembleArtifact")]
pub struct StackingEnsemble {
    bases: Vec<BaseEstimator>,
    meta: LinearSvm,
}

impl StackingEnsemble {
    /// Assemble an ensemble from pre-fitted parts.
    ///
    /// # Errors
    ///
    /// - [`StackGuardError::OrderMismatch`] if `bases` is not exactly one
    ///   estimator per family in canonical order, or the meta-model was
    ///   fitted on a different order.
    /// - [`StackGuardError::ShapeMismatch`] if the bases disagree on input
    ///   width or class count, or the concatenated width differs from the
    ///   meta-model's input width.
    /// - [`StackGuardError::MalformedModel`] if any part is internally
    ///   inconsistent.
    pub fn new(bases: Vec<BaseEstimator>, meta: LinearSvm) -> Result<Self> {
        let order: Vec<EstimatorKind> = bases.iter().map(ProbabilityEstimator::kind).collect();
        if order != CANONICAL_ORDER {
            return Err(StackGuardError::OrderMismatch {
                expected: format_order(&CANONICAL_ORDER),
                actual: format_order(&order),
            });
        }

        let n_features = bases[0].n_features();
        for base in &bases {
            base.validate()?;
            if base.n_features() != n_features {
                return Err(StackGuardError::shape_mismatch(
                    format!("{} estimator input width", base.kind()),
                    n_features,
                    base.n_features(),
                ));
            }
            if base.n_classes() != ClassLabel::COUNT {
                return Err(StackGuardError::shape_mismatch(
                    format!("{} estimator class count", base.kind()),
                    ClassLabel::COUNT,
                    base.n_classes(),
                ));
            }
        }

        meta.validate()?;
        let stacked: usize = bases.iter().map(ProbabilityEstimator::n_classes).sum();
        if meta.input_width() != stacked {
            return Err(StackGuardError::shape_mismatch(
                "meta-model input width",
                meta.input_width(),
                stacked,
            ));
        }
        if meta.is_fitted() && meta.feature_order() != order.as_slice() {
            return Err(StackGuardError::OrderMismatch {
                expected: format_order(meta.feature_order()),
                actual: format_order(&order),
            });
        }

        Ok(Self { bases, meta })
    }

    /// Load an ensemble artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ArtifactLoad`] for unreadable or invalid
    /// files, including every construction check in [`Self::new`].
    pub fn load(path: &Path) -> Result<Self> {
        let ensemble: Self = artifact::load_json(path)?;
        tracing::info!(
            path = %path.display(),
            n_features = ensemble.n_features(),
            order = %format_order(&ensemble.base_order()),
            fitted = ensemble.meta.is_fitted(),
            "Loaded stacking ensemble"
        );
        Ok(ensemble)
    }

    /// Write the ensemble artifact to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        artifact::save_json(self, path)
    }

    /// Input width shared by every base estimator.
    pub fn n_features(&self) -> usize {
        self.bases.first().map_or(0, ProbabilityEstimator::n_features)
    }

    /// Width of a concatenated row.
    pub fn stacked_width(&self) -> usize {
        self.meta.input_width()
    }

    pub fn bases(&self) -> &[BaseEstimator] {
        &self.bases
    }

    pub fn meta(&self) -> &LinearSvm {
        &self.meta
    }

    /// Families of the base estimators, in concatenation order.
    pub fn base_order(&self) -> Vec<EstimatorKind> {
        self.bases.iter().map(ProbabilityEstimator::kind).collect()
    }

    /// Column range each base estimator occupies in a concatenated row.
    pub fn block_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.bases
            .iter()
            .map(|base| {
                let range = start..start + base.n_classes();
                start = range.end;
                range
            })
            .collect()
    }

    /// Concatenated base probabilities for one input.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] if `x` is not
    /// [`Self::n_features`] wide or a base returns the wrong number of
    /// probabilities.
    pub fn stack(&self, x: &SparseVector) -> Result<Vec<f32>> {
        let mut row = Vec::with_capacity(self.stacked_width());
        for base in &self.bases {
            let proba = base.predict_proba(x)?;
            if proba.len() != base.n_classes() {
                return Err(StackGuardError::shape_mismatch(
                    format!("{} estimator output", base.kind()),
                    base.n_classes(),
                    proba.len(),
                ));
            }
            row.extend(proba);
        }
        Ok(row)
    }

    /// Concatenated rows for a batch.
    pub fn stack_batch(&self, xs: &[SparseVector]) -> Result<Vec<Vec<f32>>> {
        xs.iter().map(|x| self.stack(x)).collect()
    }

    /// Fit the meta-model on base outputs for a labelled set.
    ///
    /// Base estimators are never refit. The meta-model warm-starts from its
    /// current weights and records the base order it was fitted on.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::InvalidInput`] for empty or misaligned
    /// inputs, or any error from [`Self::stack`].
    pub fn fit(&mut self, xs: &[SparseVector], ys: &[ClassLabel]) -> Result<()> {
        check_aligned(xs, ys)?;
        let rows = self.stack_batch(xs)?;
        let order = self.base_order();
        self.meta.fit(&rows, ys, &order)
    }

    /// Predict one encoded input.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MetaModelNotFitted`] if the meta-model has
    /// never been fitted, or any error from [`Self::stack`].
    pub fn predict_one(&self, x: &SparseVector) -> Result<ClassLabel> {
        if !self.meta.is_fitted() {
            return Err(StackGuardError::MetaModelNotFitted);
        }
        let row = self.stack(x)?;
        self.meta.predict(&row)
    }

    /// Predict a batch of encoded inputs.
    pub fn predict(&self, xs: &[SparseVector]) -> Result<Vec<ClassLabel>> {
        xs.iter().map(|x| self.predict_one(x)).collect()
    }

    /// Accuracy and per-class report on a labelled set.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fit`] and [`Self::predict`].
    pub fn evaluate(&self, xs: &[SparseVector], ys: &[ClassLabel]) -> Result<Evaluation> {
        check_aligned(xs, ys)?;
        let predictions = self.predict(xs)?;
        let report = ClassificationReport::from_predictions(ys, &predictions);
        Ok(Evaluation {
            accuracy: report.accuracy,
            report,
        })
    }
}

fn check_aligned(xs: &[SparseVector], ys: &[ClassLabel]) -> Result<()> {
    if xs.is_empty() {
        return Err(StackGuardError::InvalidInput(
            "labelled set is empty".to_string(),
        ));
    }
    if xs.len() != ys.len() {
        return Err(StackGuardError::InvalidInput(format!(
            "{} inputs but {} labels",
            xs.len(),
            ys.len()
        )));
    }
    Ok(())
}

impl TryFrom<EnsembleArtifact> for StackingEnsemble {
    type Error = StackGuardError;

    fn try_from(artifact: EnsembleArtifact) -> Result<Self> {
        if artifact.format_version != FORMAT_VERSION {
            return Err(StackGuardError::MalformedModel(format!(
                "unsupported ensemble format version {} (expected {FORMAT_VERSION})",
                artifact.format_version
            )));
        }
        Self::new(artifact.bases, artifact.meta)
    }
}

impl From<StackingEnsemble> for EnsembleArtifact {
    fn from(ensemble: StackingEnsemble) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            bases: ensemble.bases,
            meta: ensemble.meta,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
