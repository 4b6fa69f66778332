//! Baseline Trainer: TF-IDF text features plus scaled price into a class-balanced logistic
//! regression, evaluated on a stratified validation split.

/// Combined text and price feature matrix.
pub mod features;
/// Multinomial logistic regression.
pub mod model;
/// Classification report.
pub mod report;
/// Price scaling.
pub mod scaler;
/// Stratified train/validation split.
pub mod split;
/// English stop words.
pub mod stopwords;
/// TF-IDF vectorizer.
pub mod vectorizer;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    error::{PipelineError, Result},
    labeling::{reporter::LabelDistribution, scores::QualityLabel},
    table::{LabeledRecord, LabeledTable},
    telemetry::{self, QualityTelemetry},
};

use features::FeatureMatrix;
use model::{ClassifierConfig, LogisticRegression};
use report::{majority_baseline_macro_f1, ClassificationReport};
use scaler::StandardScaler;
use split::stratified_split;
use vectorizer::{TfidfVectorizer, VectorizerConfig};

/// Split and model settings for the Baseline Trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Share of records held out for validation.
    pub test_size: f64,
    /// Seed of the stratified split.
    pub seed: u64,
    /// Text vectorizer settings.
    pub vectorizer: VectorizerConfig,
    /// Classifier settings.
    pub classifier: ClassifierConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            vectorizer: VectorizerConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Validation metrics of a trained baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Classification report on the validation split.
    pub report: ClassificationReport,
    /// Macro F1 of always predicting the most frequent training label.
    pub majority_baseline_macro_f1: f64,
    /// Training rows.
    pub train_size: usize,
    /// Validation rows.
    pub validation_size: usize,
    /// Text columns learned by the vectorizer.
    pub vocabulary_size: usize,
    /// Classifier steps taken.
    pub iterations: usize,
    /// Whether the classifier met its tolerance.
    pub converged: bool,
}

impl TrainingMetrics {
    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[baseline] macro_f1={:.4} majority_f1={:.4} accuracy={:.4} train={} validation={} vocab={}",
            self.report.macro_f1(),
            self.majority_baseline_macro_f1,
            self.report.accuracy,
            self.train_size,
            self.validation_size,
            self.vocabulary_size
        )
    }
}

/// The three fitted artifacts plus validation metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedBaseline {
    /// Fitted classifier.
    pub model: LogisticRegression,
    /// Fitted text vectorizer.
    pub vectorizer: TfidfVectorizer,
    /// Fitted price scaler.
    pub scaler: StandardScaler,
    /// Validation metrics.
    pub metrics: TrainingMetrics,
}

/// Trains the text + price baseline on a labeled table.
#[derive(Debug, Default, Clone)]
pub struct BaselineTrainer {
    config: TrainerConfig,
}

impl BaselineTrainer {
    /// Creates a trainer with explicit settings.
    #[must_use]
    pub const fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Splits, fits and evaluates.
    pub fn train(&self, table: &LabeledTable) -> Result<TrainedBaseline> {
        self.train_with_telemetry(table, None)
    }

    /// Splits, fits and evaluates with optional telemetry instrumentation.
    pub fn train_with_telemetry(
        &self,
        table: &LabeledTable,
        telemetry: Option<&QualityTelemetry>,
    ) -> Result<TrainedBaseline> {
        let split = stratified_split(&table.labels(), self.config.test_size, self.config.seed)?;
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "stratified split",
            json!({
                "train": split.train.len(),
                "validation": split.validation.len(),
                "seed": self.config.seed,
            }),
        );
        let records = table.records();
        let train: Vec<&LabeledRecord> = split.train.iter().map(|idx| &records[*idx]).collect();
        let validation: Vec<&LabeledRecord> =
            split.validation.iter().map(|idx| &records[*idx]).collect();
        self.fit_on_split(&train, &validation, telemetry)
    }

    /// Fits every artifact on `train` only and evaluates on `validation`.
    pub fn fit_on_split(
        &self,
        train: &[&LabeledRecord],
        validation: &[&LabeledRecord],
        telemetry: Option<&QualityTelemetry>,
    ) -> Result<TrainedBaseline> {
        if validation.is_empty() {
            return Err(PipelineError::InvalidConfig("validation split is empty".into()));
        }
        let (train_text, train_price, train_labels) = columns(train);
        let (val_text, val_price, val_labels) = columns(validation);

        let vectorizer = TfidfVectorizer::fit(self.config.vectorizer.clone(), &train_text)?;
        let scaler = StandardScaler::fit(&train_price)?;
        telemetry::log(
            telemetry,
            LogLevel::Debug,
            "features fitted",
            json!({
                "vocabulary": vectorizer.len(),
                "price_mean": scaler.mean(),
                "price_scale": scaler.scale(),
            }),
        );

        let x_train = FeatureMatrix::combine(
            vectorizer.transform(&train_text),
            &scaler.transform(&train_price),
            vectorizer.len(),
        );
        let x_val = FeatureMatrix::combine(
            vectorizer.transform(&val_text),
            &scaler.transform(&val_price),
            vectorizer.len(),
        );

        let model = LogisticRegression::fit(&self.config.classifier, &x_train, &train_labels)?;
        if !model.converged() {
            telemetry::log(
                telemetry,
                LogLevel::Warn,
                "classifier hit max_iter before converging",
                json!({ "max_iter": self.config.classifier.max_iter }),
            );
        }
        let predicted = model.predict(&x_val);
        let report = ClassificationReport::compute(&val_labels, &predicted);
        let majority = LabelDistribution::from_labels(train_labels.iter().copied())
            .majority()
            .unwrap_or(QualityLabel::Low);
        let metrics = TrainingMetrics {
            majority_baseline_macro_f1: majority_baseline_macro_f1(&val_labels, majority),
            report,
            train_size: train.len(),
            validation_size: validation.len(),
            vocabulary_size: vectorizer.len(),
            iterations: model.n_iter(),
            converged: model.converged(),
        };
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "baseline trained",
            json!({
                "macro_f1": metrics.report.macro_f1(),
                "majority_macro_f1": metrics.majority_baseline_macro_f1,
                "accuracy": metrics.report.accuracy,
                "iterations": metrics.iterations,
            }),
        );
        Ok(TrainedBaseline {
            model,
            vectorizer,
            scaler,
            metrics,
        })
    }
}

fn columns<'a>(rows: &[&'a LabeledRecord]) -> (Vec<&'a str>, Vec<f64>, Vec<QualityLabel>) {
    let text = rows.iter().map(|r| r.record.catalog_content.as_str()).collect();
    let price = rows.iter().map(|r| r.record.price).collect();
    let labels = rows.iter().map(|r| r.labels.quality_label).collect();
    (text, price, labels)
}

/// Free-function form of [`BaselineTrainer::train`] with default settings.
pub fn train_baseline_model(table: &LabeledTable) -> Result<TrainedBaseline> {
    BaselineTrainer::default().train(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        labeling::engineer_weak_labels,
        table::{CatalogRecord, CatalogTable},
    };

    #[test]
    fn vocabulary_ignores_validation_content() {
        let labeled = engineer_weak_labels(&CatalogTable::synthetic(120, 17));
        let records: Vec<&LabeledRecord> = labeled.records().iter().collect();
        let (train, validation) = records.split_at(90);
        let trainer = BaselineTrainer::default();
        let baseline = trainer.fit_on_split(train, validation, None).unwrap();

        let mut permuted: Vec<&LabeledRecord> = validation.iter().rev().copied().collect();
        permuted.extend_from_slice(validation);
        let again = trainer.fit_on_split(train, &permuted, None).unwrap();
        assert_eq!(baseline.vectorizer, again.vectorizer);
        assert_eq!(baseline.scaler, again.scaler);
        assert_eq!(again.metrics.validation_size, 60);
    }

    #[test]
    fn single_label_table_cannot_train() {
        let records = (0..20)
            .map(|idx| CatalogRecord {
                sample_id: idx.to_string(),
                catalog_content: "steel bottle".into(),
                price: 10.0 + f64::from(idx),
                image_link: None,
            })
            .collect();
        let labeled = engineer_weak_labels(&CatalogTable::from_records(records).unwrap());
        assert_eq!(labeled.distribution().present(), 1);
        let err = train_baseline_model(&labeled).unwrap_err();
        assert!(matches!(err, PipelineError::TooFewClasses { found: 1 }));
    }

    #[test]
    fn trained_baseline_reports_metrics() {
        let labeled = engineer_weak_labels(&CatalogTable::synthetic(150, 23));
        let baseline = train_baseline_model(&labeled).unwrap();
        let metrics = &baseline.metrics;
        assert_eq!(metrics.train_size + metrics.validation_size, 150);
        assert_eq!(metrics.validation_size, 30);
        assert!(metrics.vocabulary_size > 0);
        assert_eq!(baseline.model.weights().dim().0, metrics.vocabulary_size + 1);
        assert!((0.0..=1.0).contains(&metrics.report.macro_f1()));
        assert!(metrics.summary().contains("macro_f1="));
    }
}
