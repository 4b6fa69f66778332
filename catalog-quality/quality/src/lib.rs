#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Catalog quality pipeline: weak labels from text and price heuristics, then a text + price
//! baseline classifier trained on them.

/// Pipeline error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Input and labeled catalog tables.
#[path = "../table.rs"]
pub mod table;

/// TOML run configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry builder/hook for pipeline stages.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Label Engineer.
#[path = "../labeling/main.rs"]
pub mod labeling;

/// Baseline Trainer.
#[path = "../training/main.rs"]
pub mod training;

/// Artifact persistence, atomic output commit and scoring.
#[path = "../artifacts.rs"]
pub mod artifacts;

/// Pipeline entry point.
#[path = "../main.rs"]
pub mod pipeline;

pub use artifacts::{OutputPaths, OutputStage, QualityScorer};
pub use config::{LoggingConfig, PipelineConfig};
pub use error::{PipelineError, Result};
pub use labeling::{
    engineer_weak_labels,
    reporter::{summarize, LabelDistribution, LabelPalette, LabelSummary, PaletteEntry},
    scores::QualityLabel,
    DerivedLabels, LabelEngineer, LabelStatistics,
};
pub use pipeline::{new_run_id, telemetry_from_config, PipelineReport, QualityPipeline};
pub use table::{
    read_labeled_csv, CatalogRecord, CatalogTable, LabeledRecord, LabeledRow, LabeledTable,
};
pub use telemetry::{QualityTelemetry, QualityTelemetryBuilder};
pub use training::{
    train_baseline_model, BaselineTrainer, TrainedBaseline, TrainerConfig, TrainingMetrics,
};
