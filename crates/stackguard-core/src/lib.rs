//! Core types, errors, and configuration for StackGuard
//!
//! This crate contains the foundational types shared by the model and server
//! crates: the fixed class-label enumeration, the error taxonomy used across
//! the inference pipeline, and the service configuration tree.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Class labels
// ---------------------------------------------------------------------------

/// Final classification of an input text.
///
/// The index mapping is static configuration shared with the trained
/// artifacts: `0 = SQLi`, `1 = XSS`, `2 = Benign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClassLabel {
    /// SQL injection payload.
    Sqli,
    /// Cross-site scripting payload.
    Xss,
    /// Normal, non-malicious input.
    Benign,
}

impl ClassLabel {
    /// Number of classes every estimator must produce probabilities for.
    pub const COUNT: usize = 3;

    /// All labels in index order.
    pub const ALL: [ClassLabel; Self::COUNT] = [Self::Sqli, Self::Xss, Self::Benign];

    /// Map a class index to its label.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Class index used by the trained models.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Sqli => 0,
            Self::Xss => 1,
            Self::Benign => 2,
        }
    }

    /// User-facing label string returned by the HTTP boundary.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqli => "SQLi (malicious)",
            Self::Xss => "XSS (malicious)",
            Self::Benign => "Benign (normal)",
        }
    }

    /// Short name used in reports and logs.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Sqli => "sqli",
            Self::Xss => "xss",
            Self::Benign => "benign",
        }
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ClassLabel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_index(usize::from(value)).ok_or_else(|| format!("unknown class index: {value}"))
    }
}

impl From<ClassLabel> for u8 {
    fn from(label: ClassLabel) -> Self {
        // COUNT is 3, so the index always fits.
        label.index() as u8
    }
}

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address and port the HTTP service binds to.
    pub listen_addr: String,
    /// Trained artifact locations.
    pub model: ModelConfig,
    /// SQLi guardrail settings.
    pub guardrail: GuardrailConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            model: ModelConfig::default(),
            guardrail: GuardrailConfig::default(),
            logging: LoggingConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

/// Locations of the two trained artifacts.
///
/// The encoder and the ensemble are versioned as one unit and must always be
/// deployed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the trained feature encoder (JSON).
    pub encoder_path: String,
    /// Path to the trained stacking ensemble (JSON).
    pub ensemble_path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder_path: "models/encoder.json".to_string(),
            ensemble_path: "models/ensemble.json".to_string(),
        }
    }
}

/// Configuration of the SQLi false-positive guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// When `false`, raw ensemble labels are returned unchanged.
    pub enabled: bool,
    /// Replacement pattern list. `None` keeps the built-in SQLi patterns.
    pub patterns: Option<Vec<String>>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` (human-readable) or `json` (structured).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Maximum seconds to wait for in-flight predictions after a shutdown
    /// signal is received.
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the StackGuard inference pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StackGuardError {
    /// A trained artifact is missing, unreadable, or structurally invalid.
    #[error("Failed to load artifact {path}: {reason}")]
    ArtifactLoad {
        /// Path of the offending artifact.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A vector or concatenated row does not have the expected width.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// Width the component was built for.
        expected: usize,
        /// Width that was supplied.
        actual: usize,
    },

    /// Base estimators are not in the order the meta-model was fitted on.
    #[error("Base estimator order mismatch: expected [{expected}], got [{actual}]")]
    OrderMismatch {
        /// Required order.
        expected: String,
        /// Order that was supplied.
        actual: String,
    },

    /// The meta-model has no recorded fit.
    #[error("Meta-model has not been fitted")]
    MetaModelNotFitted,

    /// Estimator parameters are internally inconsistent.
    #[error("Malformed model: {0}")]
    MalformedModel(String),

    /// Invalid arguments to a core operation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Numeric backend failure during inference.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Guardrail pattern failure.
    #[error("Guardrail error: {0}")]
    Guardrail(String),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StackGuardError {
    /// Stable machine-readable code for this error, exposed at the HTTP
    /// boundary so callers can distinguish fault classes.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactLoad { .. } => "artifact_load",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::OrderMismatch { .. } => "order_mismatch",
            Self::MetaModelNotFitted => "meta_not_fitted",
            Self::MalformedModel(_) => "malformed_model",
            Self::InvalidInput(_) => "invalid_input",
            Self::Inference(_) => "inference",
            Self::Guardrail(_) => "guardrail",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
        }
    }

    /// Shorthand for a [`StackGuardError::ShapeMismatch`].
    pub fn shape_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Convenience alias for `std::result::Result<T, StackGuardError>`.
pub type Result<T> = std::result::Result<T, StackGuardError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_index_mapping_is_static() {
        assert_eq!(ClassLabel::from_index(0), Some(ClassLabel::Sqli));
        assert_eq!(ClassLabel::from_index(1), Some(ClassLabel::Xss));
        assert_eq!(ClassLabel::from_index(2), Some(ClassLabel::Benign));
        assert_eq!(ClassLabel::from_index(3), None);
        for label in ClassLabel::ALL {
            assert_eq!(ClassLabel::from_index(label.index()), Some(label));
        }
    }

    #[test]
    fn test_label_strings() {
        assert_eq!(ClassLabel::Sqli.as_str(), "SQLi (malicious)");
        assert_eq!(ClassLabel::Xss.as_str(), "XSS (malicious)");
        assert_eq!(ClassLabel::Benign.as_str(), "Benign (normal)");
        assert_eq!(ClassLabel::Xss.to_string(), "XSS (malicious)");
    }

    #[test]
    fn test_label_serde_uses_index() {
        let json = serde_json::to_string(&ClassLabel::Benign).unwrap();
        assert_eq!(json, "2");
        let label: ClassLabel = serde_json::from_str("0").unwrap();
        assert_eq!(label, ClassLabel::Sqli);
        assert!(serde_json::from_str::<ClassLabel>("7").is_err());
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:5000");
        assert_eq!(config.model.encoder_path, "models/encoder.json");
        assert!(config.guardrail.enabled);
        assert!(config.guardrail.patterns.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.shutdown.timeout_seconds, 30);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ServiceConfig = serde_yaml::from_str("listen_addr: \"127.0.0.1:8080\"\n").unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.model.ensemble_path, "models/ensemble.json");
        assert!(config.guardrail.enabled);
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            StackGuardError::ArtifactLoad {
                path: "x".to_string(),
                reason: "missing".to_string(),
            },
            StackGuardError::shape_mismatch("meta", 15, 12),
            StackGuardError::OrderMismatch {
                expected: "lr".to_string(),
                actual: "nn".to_string(),
            },
            StackGuardError::MetaModelNotFitted,
            StackGuardError::MalformedModel("x".to_string()),
            StackGuardError::InvalidInput("x".to_string()),
            StackGuardError::Inference("x".to_string()),
            StackGuardError::Guardrail("x".to_string()),
            StackGuardError::Config("x".to_string()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(StackGuardError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = StackGuardError::shape_mismatch("meta-model input", 15, 12);
        assert_eq!(
            err.to_string(),
            "Shape mismatch in meta-model input: expected 15, got 12"
        );
    }
}
