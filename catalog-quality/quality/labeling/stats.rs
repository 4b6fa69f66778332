use serde::{Deserialize, Serialize};

use super::scores::FENCE_MULTIPLIER;

/// Quantile of an ascending slice using linear interpolation between closest ranks.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Returns an ascending copy of the values.
#[must_use]
pub fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.into_iter().collect();
    out.sort_by(f64::total_cmp);
    out
}

/// Tukey fence over the price distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceFence {
    /// 25th percentile.
    pub q1: f64,
    /// 75th percentile.
    pub q3: f64,
    /// Interquartile range.
    pub iqr: f64,
    /// `q1 - 1.5 * iqr`.
    pub lower: f64,
    /// `q3 + 1.5 * iqr`.
    pub upper: f64,
}

impl PriceFence {
    /// Builds the fence from ascending prices.
    #[must_use]
    pub fn from_sorted(prices: &[f64]) -> Option<Self> {
        let q1 = quantile(prices, 0.25)?;
        let q3 = quantile(prices, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            iqr,
            lower: q1 - FENCE_MULTIPLIER * iqr,
            upper: q3 + FENCE_MULTIPLIER * iqr,
        })
    }

    /// True when the price lies strictly outside the fence.
    #[must_use]
    pub fn is_outlier(&self, price: f64) -> bool {
        price < self.lower || price > self.upper
    }
}

/// Equal-frequency price bins with duplicate edges dropped.
///
/// Bins are `[e0, e1]`, `(e1, e2]`, ... When every price is identical only one edge survives and
/// every price lands in bin 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBins {
    edges: Vec<f64>,
}

impl PriceBins {
    /// Computes `bins + 1` quantile edges from ascending prices and drops duplicates.
    #[must_use]
    pub fn from_sorted(prices: &[f64], bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let mut edges = Vec::with_capacity(bins + 1);
        for step in 0..=bins {
            let edge = quantile(prices, step as f64 / bins as f64)?;
            if edges.last() != Some(&edge) {
                edges.push(edge);
            }
        }
        Some(Self { edges })
    }

    /// Surviving quantile edges, ascending.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins actually produced (may be below the requested count).
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.edges.len().saturating_sub(1).max(1)
    }

    /// Bin index for a price. Prices outside the edges clamp to the first or last bin.
    #[must_use]
    pub fn assign(&self, price: f64) -> usize {
        let above = self.edges.partition_point(|edge| *edge < price);
        above.saturating_sub(1).min(self.bin_count() - 1)
    }

    /// Interval label for a bin, closed on the left only for the first bin.
    #[must_use]
    pub fn label(&self, bin: usize) -> String {
        let Some(&lo) = self.edges.get(bin) else {
            return String::new();
        };
        let hi = self.edges.get(bin + 1).copied().unwrap_or(lo);
        if bin == 0 {
            format!("[{lo}, {hi}]")
        } else {
            format!("({lo}, {hi}]")
        }
    }
}
