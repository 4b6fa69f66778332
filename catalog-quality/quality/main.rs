use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    artifacts::{OutputPaths, OutputStage},
    config::PipelineConfig,
    error::Result,
    labeling::{
        reporter::LabelDistribution,
        scores::{QualityLabel, PRICE_BIN_COUNT},
        LabelEngineer,
    },
    table::{CatalogTable, LabeledTable},
    telemetry::{self, QualityTelemetry},
    training::{BaselineTrainer, TrainingMetrics},
};

/// Outcome of a committed pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the outputs were committed.
    pub finished_at: DateTime<Utc>,
    /// Records read from the input table.
    pub records: usize,
    /// Weak label distribution.
    pub distribution: LabelDistribution,
    /// Price bins actually produced (at most five).
    pub price_bins: usize,
    /// Validation metrics of the baseline.
    pub metrics: TrainingMetrics,
    /// Committed output files.
    pub outputs: OutputPaths,
}

impl PipelineReport {
    /// Human-readable run summary.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "Loaded {} product entries\n\nQuality Label Distribution:\n{}\n\n\
             Validation report:\n{}\n{}\n\nSaved artifacts:\n  - {}\n  - {}\n  - {}\n  - {}",
            self.records,
            self.distribution.render(),
            self.metrics.report.render(),
            self.metrics.summary(),
            self.outputs.labeled_dataset.display(),
            self.outputs.model.display(),
            self.outputs.vectorizer.display(),
            self.outputs.scaler.display(),
        )
    }
}

/// Runs load, Label Engineer, Baseline Trainer and commit as one blocking pass.
///
/// Nothing is retried. Outputs only appear once every stage succeeded.
#[derive(Debug, Default, Clone)]
pub struct QualityPipeline {
    telemetry: Option<QualityTelemetry>,
}

impl QualityPipeline {
    /// Creates a pipeline without telemetry.
    #[must_use]
    pub const fn new() -> Self {
        Self { telemetry: None }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: QualityTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Loads the input table and engineers weak labels, without training.
    pub fn label(&self, config: &PipelineConfig) -> Result<LabeledTable> {
        let table = CatalogTable::read_csv(&config.input)?;
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "input loaded",
            json!({ "records": table.len(), "input": config.input }),
        );
        let labeled = LabelEngineer.engineer(&table);
        let distribution = labeled.distribution();
        let stats = labeled.statistics();
        let payload = json!({
            "records": labeled.len(),
            "low": distribution.count(QualityLabel::Low),
            "medium": distribution.count(QualityLabel::Medium),
            "high": distribution.count(QualityLabel::High),
            "price_bins": stats.map(|s| s.bins.bin_count()),
            "low_wc": stats.map(|s| s.low_wc),
            "high_wc": stats.map(|s| s.high_wc),
        });
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "weak labels engineered",
            payload.clone(),
        );
        if let Some(stats) = stats.filter(|s| s.bins.bin_count() < PRICE_BIN_COUNT) {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "duplicate price quantiles reduced the bin count",
                json!({ "price_bins": stats.bins.bin_count() }),
            );
        }
        telemetry::event(self.telemetry.as_ref(), "quality.labels.engineered", payload);
        Ok(labeled)
    }

    /// Full run. On failure no output file is left in place.
    pub fn run(&self, config: &PipelineConfig) -> Result<PipelineReport> {
        let result = self.execute(config);
        match &result {
            Ok(report) => {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "run committed",
                    json!({ "outputs": report.outputs }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "quality.run.committed",
                    json!({ "outputs": report.outputs, "macro_f1": report.metrics.report.macro_f1() }),
                );
            }
            Err(err) => {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Error,
                    "run failed",
                    json!({ "error": err.to_string(), "data_contract": err.is_data_contract() }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "quality.run.failed",
                    json!({ "error": err.to_string() }),
                );
            }
        }
        result
    }

    fn execute(&self, config: &PipelineConfig) -> Result<PipelineReport> {
        let started_at = Utc::now();
        config.validate()?;
        let labeled = self.label(config)?;
        let mut stage = OutputStage::new(&config.output_dir)?;
        stage.stage_labeled(&labeled)?;

        let baseline = BaselineTrainer::new(config.trainer_config())
            .train_with_telemetry(&labeled, self.telemetry.as_ref())?;
        telemetry::event(
            self.telemetry.as_ref(),
            "quality.training.completed",
            json!({
                "macro_f1": baseline.metrics.report.macro_f1(),
                "majority_macro_f1": baseline.metrics.majority_baseline_macro_f1,
                "vocabulary": baseline.metrics.vocabulary_size,
            }),
        );
        stage.stage_baseline(&baseline)?;
        let outputs = stage.commit()?;
        Ok(PipelineReport {
            started_at,
            finished_at: Utc::now(),
            records: labeled.len(),
            distribution: labeled.distribution(),
            price_bins: labeled.statistics().map_or(0, |s| s.bins.bin_count()),
            metrics: baseline.metrics,
            outputs,
        })
    }
}

/// Fresh identifier tagging one run's logs, events and manifest entry.
#[must_use]
pub fn new_run_id() -> String {
    format!("run-{}", Uuid::new_v4())
}

/// Builds telemetry from the logging section of a configuration.
pub fn telemetry_from_config(config: &PipelineConfig, run_id: &str) -> anyhow::Result<QualityTelemetry> {
    let logging = &config.logging;
    let mut builder = QualityTelemetry::builder("catalog-quality")
        .min_level(logging.min_level)
        .echo(logging.echo)
        .run_id(run_id);
    if let Some(path) = &logging.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &logging.event_log {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PipelineError, table::read_labeled_csv};
    use shared_event_bus::MemoryEventBus;
    use std::fs;
    use tempfile::tempdir;

    fn config_for(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            input: dir.join("train.csv"),
            output_dir: dir.join("out"),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn synthetic_catalog_trains_better_than_majority() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        CatalogTable::synthetic(100, 42).write_csv(&config.input).unwrap();
        let bus = Arc::new(MemoryEventBus::new(32));
        let telemetry = QualityTelemetry::builder("catalog-quality")
            .log_path(dir.path().join("logs/run.jsonl"))
            .event_publisher(bus.clone())
            .build()
            .unwrap();

        let report = QualityPipeline::new()
            .with_telemetry(telemetry)
            .run(&config)
            .unwrap();
        assert_eq!(report.records, 100);
        assert!(report.finished_at >= report.started_at);
        for label in QualityLabel::ALL {
            assert!(report.distribution.count(label) > 0, "missing {label:?}");
        }
        assert!(
            report.metrics.report.macro_f1() > report.metrics.majority_baseline_macro_f1,
            "{}",
            report.metrics.summary()
        );
        assert_eq!(report.metrics.validation_size, 20);
        assert!(report.outputs.model.exists());
        assert!(report.outputs.vectorizer.exists());
        assert!(report.outputs.scaler.exists());
        assert_eq!(read_labeled_csv(&report.outputs.labeled_dataset).unwrap().len(), 100);

        let kinds: Vec<String> = bus.snapshot().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                "quality.labels.engineered",
                "quality.training.completed",
                "quality.run.committed"
            ]
        );
        assert!(report.render().contains("Quality Label Distribution"));
    }

    #[test]
    fn missing_column_stops_before_any_output() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        fs::write(&config.input, "sample_id,price\n1,3.5\n").unwrap();
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = QualityTelemetry::builder("catalog-quality")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let err = QualityPipeline::new()
            .with_telemetry(telemetry)
            .run(&config)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column } if column == "catalog_content"));
        assert!(!config.output_dir.exists());
        assert_eq!(bus.of_type("quality.run.failed").len(), 1);
    }

    #[test]
    fn degenerate_labels_leave_no_outputs() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let mut csv = String::from("sample_id,catalog_content,price,image_link\n");
        for idx in 0..30 {
            csv.push_str(&format!("{idx},steel bottle,{},\n", 10 + idx));
        }
        fs::write(&config.input, csv).unwrap();
        let err = QualityPipeline::new().run(&config).unwrap_err();
        assert!(matches!(err, PipelineError::TooFewClasses { found: 1 }));
        assert_eq!(fs::read_dir(&config.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn label_only_does_not_train() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        CatalogTable::synthetic(40, 3).write_csv(&config.input).unwrap();
        let labeled = QualityPipeline::new().label(&config).unwrap();
        assert_eq!(labeled.len(), 40);
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn telemetry_follows_logging_section() {
        let dir = tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.logging.log_path = Some(dir.path().join("logs/quality.jsonl"));
        config.logging.event_log = Some(dir.path().join("logs/events.jsonl"));
        let run_id = new_run_id();
        assert!(run_id.starts_with("run-"));
        let telemetry = telemetry_from_config(&config, &run_id).unwrap();
        assert_eq!(telemetry.run_id(), Some(run_id.as_str()));
        telemetry.event("quality.run.committed", json!({})).unwrap();
        let events = shared_event_bus::read_events(dir.path().join("logs/events.jsonl")).unwrap();
        assert_eq!(events[0].run_id.as_deref(), Some(run_id.as_str()));
    }
}
