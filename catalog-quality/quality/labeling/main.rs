//! Label Engineer: converts raw catalog attributes into weak quality labels.
//!
//! Scoring runs in two passes. [`LabelStatistics::compute`] reads the whole table once to fix
//! the word-count quartiles, the price fence, the price bins and the per-bin mean word count.
//! [`LabelEngineer::engineer`] then scores every record against those frozen statistics, so a
//! record's labels depend on the table it was scored with but never on row order.

/// Label distribution and display configuration.
pub mod reporter;
/// Score types, weights and cut points.
pub mod scores;
/// Quantile, fence and binning helpers.
pub mod stats;

use serde::{Deserialize, Serialize};

use crate::table::{CatalogTable, LabeledRecord, LabeledTable};

use scores::{
    consistency_score, final_score, text_score, word_count, ConsistencyScore, QualityLabel,
    TextScore, PRICE_BIN_COUNT,
};
use stats::{quantile, sorted, PriceBins, PriceFence};

/// Columns derived for each record, in dependency order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedLabels {
    /// Whitespace token count of `catalog_content`.
    pub word_count: usize,
    /// Word count against the table quartiles.
    pub text_score: TextScore,
    /// Price outside the Tukey fence.
    pub price_outlier: bool,
    /// `1` unless the price is an outlier.
    pub price_sanity_score: u8,
    /// Equal-frequency price bin index.
    pub price_bin: usize,
    /// Interval label of the price bin.
    pub price_bin_label: String,
    /// Word count against the mean of the price bin.
    pub consistency_score: ConsistencyScore,
    /// Weighted composite.
    pub final_score: f64,
    /// Discrete weak label.
    pub quality_label: QualityLabel,
}

/// Table-wide statistics gathered in the first pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStatistics {
    /// 25th percentile of word count.
    pub low_wc: f64,
    /// 75th percentile of word count.
    pub high_wc: f64,
    /// Price outlier fence.
    pub fence: PriceFence,
    /// Price bins (possibly fewer than five).
    pub bins: PriceBins,
    /// Mean word count per price bin, indexed by bin.
    pub bin_mean_word_count: Vec<f64>,
}

impl LabelStatistics {
    /// First pass over the full table. Returns `None` for an empty table.
    #[must_use]
    pub fn compute(table: &CatalogTable) -> Option<Self> {
        let counts: Vec<usize> = table
            .records()
            .iter()
            .map(|record| word_count(&record.catalog_content))
            .collect();
        let sorted_counts = sorted(counts.iter().map(|&wc| wc as f64));
        let low_wc = quantile(&sorted_counts, 0.25)?;
        let high_wc = quantile(&sorted_counts, 0.75)?;

        let sorted_prices = sorted(table.records().iter().map(|record| record.price));
        let fence = PriceFence::from_sorted(&sorted_prices)?;
        let bins = PriceBins::from_sorted(&sorted_prices, PRICE_BIN_COUNT)?;

        let mut sums = vec![0.0; bins.bin_count()];
        let mut members = vec![0usize; bins.bin_count()];
        for (record, &wc) in table.records().iter().zip(&counts) {
            let bin = bins.assign(record.price);
            sums[bin] += wc as f64;
            members[bin] += 1;
        }
        let bin_mean_word_count = sums
            .iter()
            .zip(&members)
            .map(|(sum, &n)| if n == 0 { 0.0 } else { sum / n as f64 })
            .collect();

        Some(Self {
            low_wc,
            high_wc,
            fence,
            bins,
            bin_mean_word_count,
        })
    }

    /// Second-pass scoring of a single record against the frozen statistics.
    #[must_use]
    pub fn score(&self, catalog_content: &str, price: f64) -> DerivedLabels {
        let word_count = word_count(catalog_content);
        let text_score = text_score(word_count, self.low_wc, self.high_wc);
        let price_outlier = self.fence.is_outlier(price);
        let price_sanity_score = u8::from(!price_outlier);
        let price_bin = self.bins.assign(price);
        let consistency_score = consistency_score(word_count, self.bin_mean_word_count[price_bin]);
        let final_score = final_score(text_score, price_sanity_score, consistency_score);
        DerivedLabels {
            word_count,
            text_score,
            price_outlier,
            price_sanity_score,
            price_bin,
            price_bin_label: self.bins.label(price_bin),
            consistency_score,
            final_score,
            quality_label: QualityLabel::from_score(final_score),
        }
    }
}

/// Deterministic weak-label engineer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelEngineer;

impl LabelEngineer {
    /// Augments every record with its derived labels.
    #[must_use]
    pub fn engineer(&self, table: &CatalogTable) -> LabeledTable {
        let Some(stats) = LabelStatistics::compute(table) else {
            return LabeledTable::new(Vec::new(), None);
        };
        let records = table
            .records()
            .iter()
            .map(|record| LabeledRecord {
                labels: stats.score(&record.catalog_content, record.price),
                record: record.clone(),
            })
            .collect();
        LabeledTable::new(records, Some(stats))
    }
}

/// Free-function form of [`LabelEngineer::engineer`].
#[must_use]
pub fn engineer_weak_labels(table: &CatalogTable) -> LabeledTable {
    LabelEngineer.engineer(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CatalogRecord;

    fn record(id: usize, words: usize, price: f64) -> CatalogRecord {
        CatalogRecord {
            sample_id: id.to_string(),
            catalog_content: vec!["widget"; words].join(" "),
            price,
            image_link: None,
        }
    }

    fn table(rows: &[(usize, f64)]) -> CatalogTable {
        CatalogTable::from_records(
            rows.iter()
                .enumerate()
                .map(|(idx, &(words, price))| record(idx + 1, words, price))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn word_count_at_first_quartile_is_typical() {
        let table = table(&[(10, 5.0), (20, 6.0), (30, 7.0), (40, 8.0), (50, 9.0)]);
        let labeled = engineer_weak_labels(&table);
        let stats = labeled.statistics().unwrap();
        assert_eq!(stats.low_wc, 20.0);
        assert_eq!(stats.high_wc, 40.0);
        let scores: Vec<_> = labeled
            .records()
            .iter()
            .map(|r| r.labels.text_score)
            .collect();
        assert_eq!(
            scores,
            vec![
                TextScore::Short,
                TextScore::Typical,
                TextScore::Typical,
                TextScore::Typical,
                TextScore::Detailed
            ]
        );
    }

    #[test]
    fn extreme_price_is_flagged() {
        let mut rows: Vec<(usize, f64)> = (0..19).map(|i| (30, 20.0 + f64::from(i) * 0.1)).collect();
        rows.push((30, 2100.0));
        let labeled = engineer_weak_labels(&table(&rows));
        let last = labeled.records().last().unwrap();
        assert!(last.labels.price_outlier);
        assert_eq!(last.labels.price_sanity_score, 0);
        assert!(labeled.records()[..19]
            .iter()
            .all(|r| !r.labels.price_outlier && r.labels.price_sanity_score == 1));
    }

    #[test]
    fn consistency_uses_full_table_bin_means() {
        let rows: Vec<(usize, f64)> = (0..10)
            .map(|i| (if i % 2 == 0 { 10 } else { 30 }, f64::from(i / 2)))
            .collect();
        let labeled = engineer_weak_labels(&table(&rows));
        let stats = labeled.statistics().unwrap();
        assert_eq!(stats.bins.bin_count(), 5);
        assert!(stats.bin_mean_word_count.iter().all(|mean| *mean == 20.0));
        for r in labeled.records() {
            let expected = if r.labels.word_count == 10 {
                ConsistencyScore::Sparse
            } else {
                ConsistencyScore::Rich
            };
            assert_eq!(r.labels.consistency_score, expected);
        }
    }

    #[test]
    fn few_distinct_prices_do_not_fail() {
        let labeled = engineer_weak_labels(&table(&[(5, 9.99), (50, 9.99), (12, 9.99), (7, 1.0)]));
        let stats = labeled.statistics().unwrap();
        assert!(stats.bins.bin_count() < 5);
        assert_eq!(labeled.len(), 4);

        let constant = engineer_weak_labels(&table(&[(5, 3.0), (9, 3.0), (11, 3.0)]));
        assert!(constant.records().iter().all(|r| r.labels.price_bin == 0));
        assert!(constant.records().iter().all(|r| !r.labels.price_outlier));
    }

    #[test]
    fn labels_stay_in_range_and_match_composite() {
        let table = CatalogTable::synthetic(200, 11);
        let labeled = engineer_weak_labels(&table);
        for r in labeled.records() {
            let l = &r.labels;
            assert!(l.text_score.value() <= 2 && l.consistency_score.value() <= 2);
            assert!(l.price_sanity_score <= 1);
            assert!((0.0..=2.0).contains(&l.final_score));
            assert_eq!(l.quality_label, QualityLabel::from_score(l.final_score));
            assert_eq!(l.price_sanity_score == 0, l.price_outlier);
        }
    }

    #[test]
    fn engineering_is_deterministic() {
        let table = CatalogTable::synthetic(150, 3);
        let first = engineer_weak_labels(&table);
        let second = engineer_weak_labels(&table);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_table_yields_empty_labels() {
        let labeled = engineer_weak_labels(&CatalogTable::from_records(Vec::new()).unwrap());
        assert!(labeled.is_empty());
        assert!(labeled.statistics().is_none());
    }
}
