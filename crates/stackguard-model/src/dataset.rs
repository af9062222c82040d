//! Labelled dataset loading.
//!
//! Datasets are JSON arrays of `{"text": "...", "label": 0|1|2}` using the
//! same class indices as the trained models.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stackguard_core::{ClassLabel, Result, StackGuardError};

/// A single labelled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledSample {
    /// Raw input text.
    pub text: String,
    /// Ground truth label.
    pub label: ClassLabel,
}

/// Loads labelled datasets from JSON.
pub struct DatasetLoader;

impl DatasetLoader {
    /// Load a dataset from a JSON file path.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ArtifactLoad`] if the file cannot be read or
    /// parsed, including unknown label indices.
    pub fn load_from_file(path: &Path) -> Result<Vec<LabelledSample>> {
        let content = std::fs::read_to_string(path).map_err(|e| StackGuardError::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let samples =
            Self::load_from_str(&content).map_err(|e| StackGuardError::ArtifactLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(path = %path.display(), samples = samples.len(), "Loaded dataset");
        Ok(samples)
    }

    /// Load from a JSON string directly.
    pub fn load_from_str(json: &str) -> Result<Vec<LabelledSample>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Split samples into parallel text and label vectors.
pub fn split_samples(samples: &[LabelledSample]) -> (Vec<&str>, Vec<ClassLabel>) {
    samples
        .iter()
        .map(|s| (s.text.as_str(), s.label))
        .unzip()
}
