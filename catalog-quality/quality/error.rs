use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the labeling and training stages.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised by the catalog quality pipeline.
///
/// Schema errors stop the run before labeling, degenerate-distribution errors stop it before
/// training, and I/O failures always name the path involved. Nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required column is absent from the input table.
    #[error("input table is missing required column `{column}`")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },
    /// A cell could not be interpreted for its column.
    #[error("row {row}: column `{column}` has invalid value {value:?}")]
    InvalidValue {
        /// One-based data row (header excluded).
        row: usize,
        /// Column name.
        column: String,
        /// Raw cell content.
        value: String,
    },
    /// `sample_id` is not unique.
    #[error("duplicate sample_id `{sample_id}`")]
    DuplicateSampleId {
        /// Offending identifier.
        sample_id: String,
    },
    /// Fewer than two quality labels remain after label engineering.
    #[error("training needs at least 2 quality labels, found {found}")]
    TooFewClasses {
        /// Number of distinct labels present.
        found: usize,
    },
    /// A label has too few members to appear on both sides of the split.
    #[error("quality label {label} has only {count} record(s); a stratified split needs 2")]
    ClassTooSmall {
        /// Label index.
        label: u8,
        /// Number of records carrying it.
        count: usize,
    },
    /// Training prices have zero variance, so standard scaling is undefined.
    #[error("training price has zero variance (every price is {value})")]
    ZeroPriceVariance {
        /// The constant price.
        value: f64,
    },
    /// Vectorizer pruning removed every term.
    #[error("no terms remain after pruning (min_df={min_df}, max_df={max_df}); lower min_df or raise max_df")]
    EmptyVocabulary {
        /// Minimum document count.
        min_df: usize,
        /// Maximum document proportion.
        max_df: f64,
    },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// CSV decoding or encoding failure.
    #[error("csv error on {path}: {source}")]
    Csv {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },
    /// Artifact (de)serialisation failure.
    #[error("artifact codec error on {path}: {source}")]
    Artifact {
        /// Artifact file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: bincode::Error,
    },
    /// Configuration file could not be parsed.
    #[error("config error in {path}: {source}")]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors caused by the shape of the input data rather than the environment.
    #[must_use]
    pub const fn is_data_contract(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::InvalidValue { .. }
                | Self::DuplicateSampleId { .. }
                | Self::TooFewClasses { .. }
                | Self::ClassTooSmall { .. }
                | Self::ZeroPriceVariance { .. }
                | Self::EmptyVocabulary { .. }
        )
    }
}
