use serde::{Deserialize, Serialize};

use super::scores::QualityLabel;

/// Count of records per quality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    counts: [usize; 3],
}

impl LabelDistribution {
    /// Tallies a label column.
    #[must_use]
    pub fn from_labels(labels: impl IntoIterator<Item = QualityLabel>) -> Self {
        let mut counts = [0; 3];
        for label in labels {
            counts[usize::from(label.index())] += 1;
        }
        Self { counts }
    }

    /// Records carrying `label`.
    #[must_use]
    pub const fn count(&self, label: QualityLabel) -> usize {
        self.counts[label.index() as usize]
    }

    /// Total records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Share of records carrying `label` (0 for an empty table).
    #[must_use]
    pub fn share(&self, label: QualityLabel) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(label) as f64 / total as f64,
        }
    }

    /// Number of labels that occur at least once.
    #[must_use]
    pub fn present(&self) -> usize {
        self.counts.iter().filter(|count| **count > 0).count()
    }

    /// Most frequent label; ties resolve to the lower label.
    #[must_use]
    pub fn majority(&self) -> Option<QualityLabel> {
        QualityLabel::ALL
            .into_iter()
            .filter(|label| self.count(*label) > 0)
            .rev()
            .max_by_key(|label| self.count(*label))
    }

    /// Multi-line summary, one label per line.
    #[must_use]
    pub fn render(&self) -> String {
        QualityLabel::ALL
            .iter()
            .map(|label| {
                let name = match label {
                    QualityLabel::Low => "Low (0):",
                    QualityLabel::Medium => "Medium (1):",
                    QualityLabel::High => "High (2):",
                };
                format!(
                    "  {name:<12}{:>6.1}%  ({})",
                    self.share(*label) * 100.0,
                    self.count(*label)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Display attributes for one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    /// Display name.
    pub name: String,
    /// Hex color.
    pub color: String,
    /// Relative quality weight.
    pub weight: f64,
}

/// Immutable label display configuration handed to presentation consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPalette {
    entries: [PaletteEntry; 3],
}

impl Default for LabelPalette {
    fn default() -> Self {
        let entry = |label: QualityLabel, color: &str, weight: f64| PaletteEntry {
            name: label.name().to_string(),
            color: color.to_string(),
            weight,
        };
        Self {
            entries: [
                entry(QualityLabel::Low, "#FF6B6B", 0.3),
                entry(QualityLabel::Medium, "#FFD93D", 0.6),
                entry(QualityLabel::High, "#6BCF7F", 1.0),
            ],
        }
    }
}

impl LabelPalette {
    /// Display attributes for `label`.
    #[must_use]
    pub fn entry(&self, label: QualityLabel) -> &PaletteEntry {
        &self.entries[usize::from(label.index())]
    }
}

/// Per-label aggregate over a labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    /// Label.
    pub label: QualityLabel,
    /// Records carrying it.
    pub count: usize,
    /// Share of the dataset.
    pub share: f64,
    /// Mean listed price.
    pub mean_price: f64,
    /// Mean composite score.
    pub mean_final_score: f64,
}

/// Aggregates `(label, price, final_score)` rows into one summary per present label.
#[must_use]
pub fn summarize(rows: impl IntoIterator<Item = (QualityLabel, f64, f64)>) -> Vec<LabelSummary> {
    let mut counts = [0usize; 3];
    let mut prices = [0.0; 3];
    let mut scores = [0.0; 3];
    for (label, price, score) in rows {
        let idx = usize::from(label.index());
        counts[idx] += 1;
        prices[idx] += price;
        scores[idx] += score;
    }
    let total: usize = counts.iter().sum();
    QualityLabel::ALL
        .into_iter()
        .filter_map(|label| {
            let idx = usize::from(label.index());
            let count = counts[idx];
            (count > 0).then(|| LabelSummary {
                label,
                count,
                share: count as f64 / total as f64,
                mean_price: prices[idx] / count as f64,
                mean_final_score: scores[idx] / count as f64,
            })
        })
        .collect()
}
