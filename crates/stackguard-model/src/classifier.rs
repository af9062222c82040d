//! Inference context.
//!
//! A [`Classifier`] owns the trained encoder, the stacking ensemble, and the
//! guardrail. It is built once at startup and shared read-only.

use std::path::Path;

use serde::Serialize;
use stackguard_core::{ClassLabel, GuardrailConfig, ModelConfig, Result, StackGuardError};

use crate::encoder::TfidfEncoder;
use crate::ensemble::StackingEnsemble;
use crate::guardrail::SqliGuardrail;

/// Outcome of classifying one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Label produced by the ensemble.
    pub raw: ClassLabel,
    /// Label after the guardrail.
    pub label: ClassLabel,
    /// `true` when the guardrail changed the label.
    pub overridden: bool,
}

/// Encoder, ensemble, and guardrail bundled for inference.
#[derive(Debug, Clone)]
pub struct Classifier {
    encoder: TfidfEncoder,
    ensemble: StackingEnsemble,
    guardrail: SqliGuardrail,
}

impl Classifier {
    /// Bundle already-built components.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] if the encoder dimension
    /// differs from the ensemble's input width, and
    /// [`StackGuardError::MetaModelNotFitted`] if the meta-model has never
    /// been fitted.
    pub fn new(
        encoder: TfidfEncoder,
        ensemble: StackingEnsemble,
        guardrail: SqliGuardrail,
    ) -> Result<Self> {
        if encoder.dimension() != ensemble.n_features() {
            return Err(StackGuardError::shape_mismatch(
                "encoder dimension vs ensemble input",
                ensemble.n_features(),
                encoder.dimension(),
            ));
        }
        if !ensemble.meta().is_fitted() {
            return Err(StackGuardError::MetaModelNotFitted);
        }
        Ok(Self {
            encoder,
            ensemble,
            guardrail,
        })
    }

    /// Load both artifacts and build the guardrail.
    ///
    /// # Errors
    ///
    /// Any load, validation, or guardrail compilation failure. Callers must
    /// not serve with a partially loaded classifier.
    pub fn load(model: &ModelConfig, guardrail: &GuardrailConfig) -> Result<Self> {
        let encoder = TfidfEncoder::load(Path::new(&model.encoder_path))?;
        let ensemble = StackingEnsemble::load(Path::new(&model.ensemble_path))?;
        let guardrail = SqliGuardrail::from_config(guardrail)?;
        let classifier = Self::new(encoder, ensemble, guardrail)?;
        tracing::info!(
            vocabulary_size = classifier.encoder.dimension(),
            guardrail = classifier.guardrail.is_enabled(),
            "Classifier ready"
        );
        Ok(classifier)
    }

    /// Classify one text.
    ///
    /// # Errors
    ///
    /// Propagates [`StackGuardError::ShapeMismatch`] and inference failures
    /// from the ensemble.
    pub fn classify(&self, text: &str) -> Result<Verdict> {
        let x = self.encoder.encode(text);
        let raw = self.ensemble.predict_one(&x)?;
        let label = self.guardrail.apply(text, raw);
        Ok(Verdict {
            raw,
            label,
            overridden: raw != label,
        })
    }

    pub fn encoder(&self) -> &TfidfEncoder {
        &self.encoder
    }

    pub fn ensemble(&self) -> &StackingEnsemble {
        &self.ensemble
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_fixture_classifies_examples() {
        let classifier = testing::fixture_classifier();
        for (text, expected) in [
            ("<script>alert(1)</script>", ClassLabel::Xss),
            ("' OR 1=1 --", ClassLabel::Sqli),
            ("drop table accounts", ClassLabel::Sqli),
            ("hello world", ClassLabel::Benign),
            ("good morning", ClassLabel::Benign),
        ] {
            let verdict = classifier.classify(text).unwrap();
            assert_eq!(verdict.label, expected, "text: {text}");
            assert!(!verdict.overridden);
        }
    }

    #[test]
    fn test_guardrail_downgrades_unsupported_sqli() {
        let classifier = testing::fixture_classifier();
        let verdict = classifier.classify("select your favourite colour").unwrap();
        assert_eq!(verdict.raw, ClassLabel::Sqli);
        assert_eq!(verdict.label, ClassLabel::Benign);
        assert!(verdict.overridden);
    }

    #[test]
    fn test_raw_sqli_on_script_tag_becomes_benign() {
        let classifier = testing::always_sqli_classifier();
        let verdict = classifier.classify("<script>alert(1)</script>").unwrap();
        assert_eq!(verdict.raw, ClassLabel::Sqli);
        assert_eq!(verdict.label, ClassLabel::Benign);

        let kept = classifier.classify("' OR 1=1 --").unwrap();
        assert_eq!(kept.label, ClassLabel::Sqli);
        assert!(!kept.overridden);
    }

    #[test]
    fn test_disabled_guardrail_returns_raw_label() {
        let classifier = Classifier::new(
            testing::fixture_encoder(),
            testing::fixture_ensemble(),
            SqliGuardrail::disabled(),
        )
        .unwrap();
        let verdict = classifier.classify("select your favourite colour").unwrap();
        assert_eq!(verdict.label, ClassLabel::Sqli);
    }

    #[test]
    fn test_encoder_dimension_must_match_ensemble() {
        let encoder = crate::encoder::TfidfEncoder::fit(
            &["only three words"],
            &crate::encoder::TfidfConfig::default(),
        )
        .unwrap();
        let err = Classifier::new(
            encoder,
            testing::fixture_ensemble(),
            SqliGuardrail::new().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StackGuardError::ShapeMismatch {
                expected: 42,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_load_from_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let model = testing::write_fixture_artifacts(dir.path()).unwrap();
        let classifier = Classifier::load(&model, &GuardrailConfig::default()).unwrap();
        assert_eq!(
            classifier.classify("<svg onload=alert(1)>").unwrap().label,
            ClassLabel::Xss
        );
    }

    #[test]
    fn test_load_missing_artifact_fails() {
        let model = ModelConfig {
            encoder_path: "/nonexistent/encoder.json".to_string(),
            ensemble_path: "/nonexistent/ensemble.json".to_string(),
        };
        let err = Classifier::load(&model, &GuardrailConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "artifact_load");
    }
}
