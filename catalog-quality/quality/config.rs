use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;

use crate::{
    error::{PipelineError, Result},
    training::{model::ClassifierConfig, vectorizer::VectorizerConfig, TrainerConfig},
};

/// Log and event sinks of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON-lines log file; no file logging when unset.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log; no events when unset.
    pub event_log: Option<PathBuf>,
    /// Records below this level are dropped.
    pub min_level: LogLevel,
    /// Mirror log records to stderr.
    pub echo: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            event_log: None,
            min_level: LogLevel::Info,
            echo: false,
        }
    }
}

/// Settings of one pipeline run, loadable from TOML. Every field has a default.
///
/// ```toml
/// input = "data/train.csv"
/// output_dir = "out"
/// seed = 42
///
/// [vectorizer]
/// min_df = 5
///
/// [logging]
/// log_path = "logs/quality.jsonl"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input catalog CSV.
    pub input: PathBuf,
    /// Directory receiving the labeled dataset and the three artifacts.
    pub output_dir: PathBuf,
    /// Seed of the stratified split.
    pub seed: u64,
    /// Share of records held out for validation.
    pub test_size: f64,
    /// Text vectorizer settings.
    pub vectorizer: VectorizerConfig,
    /// Classifier settings.
    pub classifier: ClassifierConfig,
    /// Log and event sinks.
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let trainer = TrainerConfig::default();
        Self {
            input: PathBuf::from("train.csv"),
            output_dir: PathBuf::from("."),
            seed: trainer.seed,
            test_size: trainer.test_size,
            vectorizer: trainer.vectorizer,
            classifier: trainer.classifier,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a TOML file. Relative paths resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| PipelineError::io(path, err))?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = base.join(&*candidate);
            }
        };
        resolve(&mut config.input);
        resolve(&mut config.output_dir);
        if let Some(log_path) = config.logging.log_path.as_mut() {
            resolve(log_path);
        }
        if let Some(event_log) = config.logging.event_log.as_mut() {
            resolve(event_log);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges before any work starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_size must lie in (0, 1), got {}",
                self.test_size
            )));
        }
        self.vectorizer.validate()?;
        self.classifier.validate()
    }

    /// Trainer settings carried by this configuration.
    #[must_use]
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            test_size: self.test_size,
            seed: self.seed,
            vectorizer: self.vectorizer.clone(),
            classifier: self.classifier.clone(),
        }
    }
}
