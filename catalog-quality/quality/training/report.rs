use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::labeling::scores::QualityLabel;

/// Precision, recall and F1 for one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Label the row describes.
    pub label: QualityLabel,
    /// Correct share of predictions for the label.
    pub precision: f64,
    /// Share of the label's records that were found.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Validation records carrying the label.
    pub support: usize,
}

/// Averaged metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    /// Averaged precision.
    pub precision: f64,
    /// Averaged recall.
    pub recall: f64,
    /// Averaged F1.
    pub f1: f64,
    /// Total support.
    pub support: usize,
}

/// Validation classification report.
///
/// Rows cover every label that occurs in either the truth or the predictions. A zero denominator
/// yields 0 for that metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Per-label rows, ascending.
    pub classes: Vec<ClassMetrics>,
    /// Share of correct predictions.
    pub accuracy: f64,
    /// Unweighted mean over labels.
    pub macro_avg: AveragedMetrics,
    /// Support-weighted mean over labels.
    pub weighted_avg: AveragedMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Scores predictions against the truth.
    ///
    /// # Panics
    ///
    /// Panics when the two columns differ in length.
    #[must_use]
    pub fn compute(truth: &[QualityLabel], predicted: &[QualityLabel]) -> Self {
        assert_eq!(truth.len(), predicted.len(), "one prediction per record");
        let labels: Vec<QualityLabel> = QualityLabel::ALL
            .into_iter()
            .filter(|label| truth.contains(label) || predicted.contains(label))
            .collect();
        let classes: Vec<ClassMetrics> = labels
            .iter()
            .map(|&label| {
                let tp = truth
                    .iter()
                    .zip(predicted)
                    .filter(|(t, p)| **t == label && **p == label).count();
                let predicted_pos = predicted.iter().filter(|p| **p == label).count();
                let support = truth.iter().filter(|t| **t == label).count();
                let precision = ratio(tp, predicted_pos);
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

        let total = truth.len();
        let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
        let k = classes.len().max(1) as f64;
        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
            support: total,
        };
        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / total.max(1) as f64
        };
        let weighted_avg = AveragedMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };
        Self {
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
        }
    }

    /// Macro-averaged F1.
    #[must_use]
    pub fn macro_f1(&self) -> f64 {
        self.macro_avg.f1
    }

    /// Text table in the usual precision/recall/f1/support layout.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "{:>14} {:>9} {:>9} {:>9} {:>9}\n\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for class in &self.classes {
            let _ = writeln!(
                out,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label.index(),
                class.precision,
                class.recall,
                class.f1,
                class.support
            );
        }
        let total = self.macro_avg.support;
        let _ = writeln!(
            out,
            "\n{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        );
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                out,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            );
        }
        out
    }
}

/// Macro F1 of always predicting `majority` on the given truth column.
#[must_use]
pub fn majority_baseline_macro_f1(truth: &[QualityLabel], majority: QualityLabel) -> f64 {
    let predicted = vec![majority; truth.len()];
    ClassificationReport::compute(truth, &predicted).macro_f1()
}

#[cfg(test)]
mod tests {
    use super::*;
    use QualityLabel::{High, Low, Medium};

    #[test]
    fn perfect_predictions_score_one() {
        let truth = [Low, Medium, High, Medium];
        let report = ClassificationReport::compute(&truth, &truth);
        assert!((report.macro_f1() - 1.0).abs() < 1e-12);
        assert!((report.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn per_class_metrics() {
        let truth = [Low, Low, Medium, High];
        let predicted = [Low, Medium, Medium, Medium];
        let report = ClassificationReport::compute(&truth, &predicted);
        let low = &report.classes[0];
        assert!((low.precision - 1.0).abs() < 1e-12);
        assert!((low.recall - 0.5).abs() < 1e-12);
        let medium = &report.classes[1];
        assert!((medium.precision - 1.0 / 3.0).abs() < 1e-12);
        assert!((medium.recall - 1.0).abs() < 1e-12);
        let high = &report.classes[2];
        assert_eq!(high.f1, 0.0);
        assert_eq!(high.support, 1);
        assert!((report.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn predicted_only_label_gets_a_row() {
        let report = ClassificationReport::compute(&[Low, Low], &[Low, High]);
        assert_eq!(report.classes.len(), 2);
        assert_eq!(report.classes[1].support, 0);
    }

    #[test]
    fn majority_baseline_is_weak_on_balanced_truth() {
        let truth = [Low, Medium, High, Medium];
        let f1 = majority_baseline_macro_f1(&truth, Medium);
        assert!((f1 - (2.0 * 0.5 / 1.5) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn render_lists_every_class() {
        let report = ClassificationReport::compute(&[Low, High], &[Low, Low]);
        let text = report.render();
        assert!(text.contains("macro avg"));
        assert!(text.contains("accuracy"));
        assert_eq!(text.lines().filter(|l| l.trim_start().starts_with('2')).count(), 1);
    }
}
