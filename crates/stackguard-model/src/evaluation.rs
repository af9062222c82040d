//! Offline evaluation metrics.
//!
//! Computes a per-class precision / recall / F1 report from predicted and
//! ground-truth labels, plus macro and support-weighted averages.

use serde::Serialize;
use stackguard_core::ClassLabel;

/// Metrics for one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: ClassLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of ground-truth samples of this class.
    pub support: usize,
}

/// Averaged precision / recall / F1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Structured per-class classification summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    /// `confusion[true][predicted]`.
    pub confusion: [[usize; ClassLabel::COUNT]; ClassLabel::COUNT],
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

/// Result of [`crate::StackingEnsemble::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub report: ClassificationReport,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

impl ClassificationReport {
    /// Build a report from aligned label slices.
    ///
    /// Pairs beyond the shorter slice are ignored; callers check lengths.
    pub fn from_predictions(y_true: &[ClassLabel], y_pred: &[ClassLabel]) -> Self {
        let mut confusion = [[0usize; ClassLabel::COUNT]; ClassLabel::COUNT];
        for (t, p) in y_true.iter().zip(y_pred) {
            confusion[t.index()][p.index()] += 1;
        }

        let total: usize = confusion.iter().flatten().sum();
        let correct: usize = (0..ClassLabel::COUNT).map(|k| confusion[k][k]).sum();

        let classes: Vec<ClassMetrics> = ClassLabel::ALL
            .iter()
            .map(|&label| {
                let k = label.index();
                let tp = confusion[k][k];
                let predicted: usize = (0..ClassLabel::COUNT).map(|t| confusion[t][k]).sum();
                let support: usize = confusion[k].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let n_classes = classes.len() as f64;
        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n_classes,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n_classes,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n_classes,
        };

        let weighted = |metric: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
        };

        Self {
            classes,
            confusion,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
            total,
        }
    }

    /// Metrics for a single class.
    pub fn class(&self, label: ClassLabel) -> &ClassMetrics {
        &self.classes[label.index()]
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>12} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                c.label.short_name(),
                c.precision,
                c.recall,
                c.f1,
                c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}
