use std::{
    collections::HashSet,
    fs,
    path::Path,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, Result},
    labeling::{
        reporter::LabelDistribution,
        scores::{ConsistencyScore, QualityLabel, TextScore},
        DerivedLabels, LabelStatistics,
    },
};

/// Required input columns.
pub const REQUIRED_COLUMNS: [&str; 3] = ["sample_id", "catalog_content", "price"];

/// One product catalog entry as read from the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Unique key.
    pub sample_id: String,
    /// Free catalog text.
    pub catalog_content: String,
    /// Listed price.
    pub price: f64,
    /// Opaque image reference carried through untouched.
    pub image_link: Option<String>,
}

/// Ordered in-memory catalog with a validated schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogTable {
    records: Vec<CatalogRecord>,
}

impl CatalogTable {
    /// Builds a table, rejecting non-finite prices and duplicate ids.
    pub fn from_records(records: Vec<CatalogRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if !record.price.is_finite() {
                return Err(PipelineError::InvalidValue {
                    row: idx + 1,
                    column: "price".into(),
                    value: record.price.to_string(),
                });
            }
            if !seen.insert(record.sample_id.as_str()) {
                return Err(PipelineError::DuplicateSampleId {
                    sample_id: record.sample_id.clone(),
                });
            }
        }
        Ok(Self { records })
    }

    /// Reads a CSV with a header row. Extra columns are ignored.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|err| PipelineError::io(path, err))?;
        let mut reader = csv::Reader::from_reader(file);
        let headers = reader
            .headers()
            .map_err(|err| PipelineError::csv(path, err))?
            .clone();
        let position = |column: &str| {
            headers
                .iter()
                .position(|header| header.trim() == column)
                .ok_or_else(|| PipelineError::MissingColumn {
                    column: column.to_string(),
                })
        };
        let id_col = position("sample_id")?;
        let text_col = position("catalog_content")?;
        let price_col = position("price")?;
        let image_col = position("image_link").ok();

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            let row = row.map_err(|err| PipelineError::csv(path, err))?;
            let cell = |col: usize| row.get(col).unwrap_or_default();
            let raw_price = cell(price_col);
            let price = raw_price
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|price| price.is_finite())
                .ok_or_else(|| PipelineError::InvalidValue {
                    row: idx + 1,
                    column: "price".into(),
                    value: raw_price.to_string(),
                })?;
            records.push(CatalogRecord {
                sample_id: cell(id_col).to_string(),
                catalog_content: cell(text_col).to_string(),
                price,
                image_link: image_col
                    .map(|col| cell(col).to_string())
                    .filter(|link| !link.is_empty()),
            });
        }
        Self::from_records(records)
    }

    /// Writes the table in the input layout.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path).map_err(|err| PipelineError::csv(path, err))?;
        writer
            .write_record(["sample_id", "catalog_content", "price", "image_link"])
            .map_err(|err| PipelineError::csv(path, err))?;
        for record in &self.records {
            writer
                .write_record([
                    record.sample_id.as_str(),
                    record.catalog_content.as_str(),
                    &record.price.to_string(),
                    record.image_link.as_deref().unwrap_or_default(),
                ])
                .map_err(|err| PipelineError::csv(path, err))?;
        }
        writer.flush().map_err(|err| PipelineError::io(path, err))
    }

    /// Deterministic synthetic catalog: prices uniform in `[5, 50]`, text of 10 to 300 words.
    #[must_use]
    pub fn synthetic(count: usize, seed: u64) -> Self {
        const ADJECTIVES: [&str; 20] = [
            "steel", "cotton", "bamboo", "copper", "walnut", "linen", "silicone", "ceramic",
            "leather", "wool", "granite", "maple", "velvet", "carbon", "crystal", "canvas",
            "marble", "nylon", "oak", "porcelain",
        ];
        const NOUNS: [&str; 20] = [
            "bottle", "kettle", "blanket", "lamp", "mug", "skillet", "wallet", "pillow",
            "grinder", "tumbler", "planter", "backpack", "scarf", "spatula", "candle", "organizer",
            "speaker", "charger", "cutter", "strainer",
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let records = (0..count)
            .map(|idx| {
                let words = rng.gen_range(10..=300);
                let catalog_content = (0..words)
                    .map(|_| {
                        let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
                        let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
                        format!("{adjective}{noun}")
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                let price = (rng.gen_range(5.0..=50.0_f64) * 100.0).round() / 100.0;
                CatalogRecord {
                    sample_id: (idx + 1).to_string(),
                    catalog_content,
                    price,
                    image_link: Some(format!("https://images.example.com/{}.jpg", idx + 1)),
                }
            })
            .collect();
        Self { records }
    }

    /// Records in input order.
    #[must_use]
    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Input record plus its derived labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    /// Original input record.
    pub record: CatalogRecord,
    /// Derived columns.
    pub labels: DerivedLabels,
}

/// Output of the Label Engineer: the dataset of record for training and serving.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    records: Vec<LabeledRecord>,
    statistics: Option<LabelStatistics>,
}

impl LabeledTable {
    pub(crate) fn new(records: Vec<LabeledRecord>, statistics: Option<LabelStatistics>) -> Self {
        Self {
            records,
            statistics,
        }
    }

    /// Labeled records in input order.
    #[must_use]
    pub fn records(&self) -> &[LabeledRecord] {
        &self.records
    }

    /// First-pass statistics the records were scored with (`None` for an empty table).
    #[must_use]
    pub fn statistics(&self) -> Option<&LabelStatistics> {
        self.statistics.as_ref()
    }

    /// Quality label column.
    #[must_use]
    pub fn labels(&self) -> Vec<QualityLabel> {
        self.records
            .iter()
            .map(|record| record.labels.quality_label)
            .collect()
    }

    /// Count and share per quality label.
    #[must_use]
    pub fn distribution(&self) -> LabelDistribution {
        LabelDistribution::from_labels(self.records.iter().map(|r| r.labels.quality_label))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes input columns followed by the eight derived columns.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path).map_err(|err| PipelineError::csv(path, err))?;
        for record in &self.records {
            writer
                .serialize(LabeledRow::from(record))
                .map_err(|err| PipelineError::csv(path, err))?;
        }
        if self.records.is_empty() {
            writer
                .write_record(LabeledRow::HEADER)
                .map_err(|err| PipelineError::csv(path, err))?;
        }
        writer.flush().map_err(|err| PipelineError::io(path, err))
    }
}

/// Flat row of a persisted labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    /// Unique key.
    pub sample_id: String,
    /// Free catalog text.
    pub catalog_content: String,
    /// Listed price.
    pub price: f64,
    /// Opaque image reference.
    pub image_link: Option<String>,
    /// Whitespace token count.
    pub word_count: usize,
    /// Text score.
    pub text_score: TextScore,
    /// Tukey fence outlier flag.
    pub price_outlier: bool,
    /// `1` unless outlier.
    pub price_sanity_score: u8,
    /// Price bin interval label.
    pub price_bin: String,
    /// Consistency score.
    pub consistency_score: ConsistencyScore,
    /// Weighted composite.
    pub final_score: f64,
    /// Weak label.
    pub quality_label: QualityLabel,
}

impl LabeledRow {
    /// Column order of a labeled dataset.
    pub const HEADER: [&'static str; 12] = [
        "sample_id",
        "catalog_content",
        "price",
        "image_link",
        "word_count",
        "text_score",
        "price_outlier",
        "price_sanity_score",
        "price_bin",
        "consistency_score",
        "final_score",
        "quality_label",
    ];
}

impl From<&LabeledRecord> for LabeledRow {
    fn from(labeled: &LabeledRecord) -> Self {
        let LabeledRecord { record, labels } = labeled;
        Self {
            sample_id: record.sample_id.clone(),
            catalog_content: record.catalog_content.clone(),
            price: record.price,
            image_link: record.image_link.clone(),
            word_count: labels.word_count,
            text_score: labels.text_score,
            price_outlier: labels.price_outlier,
            price_sanity_score: labels.price_sanity_score,
            price_bin: labels.price_bin_label.clone(),
            consistency_score: labels.consistency_score,
            final_score: labels.final_score,
            quality_label: labels.quality_label,
        }
    }
}

/// Reads a labeled dataset written by [`LabeledTable::write_csv`].
pub fn read_labeled_csv(path: impl AsRef<Path>) -> Result<Vec<LabeledRow>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|err| PipelineError::csv(path, err))?;
    let headers = reader
        .headers()
        .map_err(|err| PipelineError::csv(path, err))?
        .clone();
    if let Some(missing) = LabeledRow::HEADER
        .into_iter()
        .find(|column| !headers.iter().any(|header| header == *column))
    {
        return Err(PipelineError::MissingColumn {
            column: missing.to_string(),
        });
    }
    reader
        .deserialize()
        .map(|row| row.map_err(|err| PipelineError::csv(path, err)))
        .collect()
}
