//! Rule-based SQLi false-positive guardrail.
//!
//! The ensemble over-predicts SQL injection on ordinary prose. When the raw
//! label is SQLi but the text contains none of the known SQL attack
//! signatures, the label is downgraded to Benign. XSS and Benign labels pass
//! through unchanged.

use regex::{Regex, RegexBuilder};
use stackguard_core::{ClassLabel, GuardrailConfig, Result, StackGuardError};

/// Built-in SQL attack signatures, matched case-insensitively.
const DEFAULT_PATTERNS: [(&str, &str); 6] = [
    ("union_select", r"(union\s+select)"),
    ("or_tautology", r"(or\s+1=1)"),
    ("comment", r"(--|#)"),
    ("drop_table", r"(drop\s+table)"),
    ("insert_into", r"(insert\s+into)"),
    ("update_set", r"(update\s+\w+\s+set)"),
];

/// A named guardrail pattern.
#[derive(Debug, Clone)]
struct SignaturePattern {
    name: String,
    regex: Regex,
}

fn compile_signature_patterns(
    defs: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<SignaturePattern>> {
    defs.into_iter()
        .map(|(name, pattern)| {
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    StackGuardError::Guardrail(format!(
                        "Failed to compile pattern '{name}': {e}"
                    ))
                })?;
            Ok(SignaturePattern { name, regex })
        })
        .collect()
}

/// Downgrades SQLi predictions that carry no SQL signature.
#[derive(Debug, Clone)]
pub struct SqliGuardrail {
    patterns: Vec<SignaturePattern>,
    enabled: bool,
}

impl SqliGuardrail {
    /// Guardrail with the built-in signature set.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::Guardrail`] if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        let patterns = compile_signature_patterns(
            DEFAULT_PATTERNS
                .iter()
                .map(|(name, pattern)| (name.to_string(), pattern.to_string())),
        )?;
        Ok(Self {
            patterns,
            enabled: true,
        })
    }

    /// Guardrail with a caller-supplied signature set.
    ///
    /// Patterns are named `custom_<n>` in list order.
    pub fn with_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = compile_signature_patterns(
            patterns
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("custom_{i}"), p.as_ref().to_string())),
        )?;
        Ok(Self {
            patterns,
            enabled: true,
        })
    }

    /// A guardrail that never changes a label.
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
            enabled: false,
        }
    }

    /// Build from the `guardrail` section of the service configuration.
    pub fn from_config(config: &GuardrailConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        match &config.patterns {
            Some(patterns) => Self::with_patterns(patterns),
            None => Self::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Names of the active patterns, in evaluation order.
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Name of the first pattern that matches `text`, if any.
    pub fn matched_pattern(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(text))
            .map(|p| p.name.as_str())
    }

    /// Final label for `text` given the ensemble's raw label.
    pub fn apply(&self, text: &str, predicted: ClassLabel) -> ClassLabel {
        if !self.enabled || predicted != ClassLabel::Sqli {
            return predicted;
        }
        match self.matched_pattern(text) {
            Some(pattern) => {
                tracing::trace!(pattern, "SQLi prediction confirmed by signature");
                predicted
            }
            None => {
                tracing::debug!(text_len = text.len(), "SQLi prediction downgraded to benign");
                ClassLabel::Benign
            }
        }
    }
}
