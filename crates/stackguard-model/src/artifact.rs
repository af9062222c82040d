//! JSON persistence for trained artifacts.
//!
//! The encoder and the ensemble are stored as two separate JSON documents.
//! Every read or parse failure is reported as
//! [`StackGuardError::ArtifactLoad`] so startup can refuse to serve with
//! partial state.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stackguard_core::{Result, StackGuardError};

/// Current on-disk format version for both artifacts.
pub const FORMAT_VERSION: u32 = 1;

/// Load and validate an artifact from `path`.
///
/// # Errors
///
/// Returns [`StackGuardError::ArtifactLoad`] if the file cannot be read or
/// does not deserialize (including failed structural validation).
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| StackGuardError::ArtifactLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let artifact = serde_json::from_str(&contents).map_err(|e| StackGuardError::ArtifactLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    tracing::info!(
        path = %path.display(),
        bytes = contents.len(),
        "Loaded artifact"
    );
    Ok(artifact)
}

/// Write an artifact to `path` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`StackGuardError::Serialization`] if encoding fails, or
/// [`StackGuardError::Config`] if the file cannot be written.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| {
        StackGuardError::Config(format!("Failed to write {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), "Saved artifact");
    Ok(())
}
