//! Inference pipeline for StackGuard
//!
//! This crate turns raw text into a final [`ClassLabel`]:
//!
//! ```text
//! text → TfidfEncoder → SparseVector → StackingEnsemble → raw label → SqliGuardrail → label
//! ```
//!
//! - [`encoder`]: TF-IDF feature encoder
//! - [`estimators`]: the five base estimator families
//! - [`meta`]: linear SVM meta-model
//! - [`ensemble`]: stacking over the base estimators
//! - [`guardrail`]: SQLi false-positive override
//! - [`classifier`]: the bundled, shareable inference context
//! - [`evaluation`] and [`dataset`]: offline tooling
//!
//! [`ClassLabel`]: stackguard_core::ClassLabel

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod encoder;
pub mod ensemble;
pub mod estimators;
pub mod evaluation;
pub mod guardrail;
pub mod meta;
pub mod sparse;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use classifier::{Classifier, Verdict};
pub use dataset::{DatasetLoader, LabelledSample};
pub use encoder::{TfidfConfig, TfidfEncoder};
pub use ensemble::StackingEnsemble;
pub use estimators::{BaseEstimator, EstimatorKind, ProbabilityEstimator, CANONICAL_ORDER};
pub use evaluation::{ClassificationReport, Evaluation};
pub use guardrail::SqliGuardrail;
pub use meta::{LinearSvm, SvmConfig};
pub use sparse::SparseVector;
