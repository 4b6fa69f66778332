use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{PipelineError, Result},
    labeling::scores::QualityLabel,
    table::LabeledTable,
    training::{
        features::FeatureMatrix, model::LogisticRegression, scaler::StandardScaler,
        vectorizer::TfidfVectorizer, TrainedBaseline,
    },
};

/// File name of the persisted labeled dataset.
pub const LABELED_DATASET_FILE: &str = "train_with_quality_label.csv";
/// File name of the fitted classifier.
pub const MODEL_FILE: &str = "model_logistic_regression.bin";
/// File name of the fitted text vectorizer.
pub const VECTORIZER_FILE: &str = "tfidf_vectorizer.bin";
/// File name of the fitted price scaler.
pub const SCALER_FILE: &str = "price_scaler.bin";

const PARTIAL_SUFFIX: &str = ".partial";
const PREVIOUS_SUFFIX: &str = ".previous";

/// Serialises one artifact with bincode.
pub fn save_artifact<T: Serialize>(path: impl AsRef<Path>, artifact: &T) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| PipelineError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, artifact).map_err(|source| PipelineError::Artifact {
        path: path.to_path_buf(),
        source,
    })?;
    writer
        .into_inner()
        .map_err(|err| PipelineError::io(path, err.into_error()))?
        .sync_all()
        .map_err(|err| PipelineError::io(path, err))
}

/// Loads one artifact written by [`save_artifact`].
pub fn load_artifact<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| PipelineError::io(path, err))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| PipelineError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Final locations of a committed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Labeled dataset.
    pub labeled_dataset: PathBuf,
    /// Classifier artifact.
    pub model: PathBuf,
    /// Vectorizer artifact.
    pub vectorizer: PathBuf,
    /// Scaler artifact.
    pub scaler: PathBuf,
}

impl OutputPaths {
    /// Standard file names under `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            labeled_dataset: dir.join(LABELED_DATASET_FILE),
            model: dir.join(MODEL_FILE),
            vectorizer: dir.join(VECTORIZER_FILE),
            scaler: dir.join(SCALER_FILE),
        }
    }

    fn all(&self) -> [&Path; 4] {
        [
            &self.labeled_dataset,
            &self.model,
            &self.vectorizer,
            &self.scaler,
        ]
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn partial_path(path: &Path) -> PathBuf {
    suffixed(path, PARTIAL_SUFFIX)
}

/// Writes every output to a `.partial` file and renames them into place together.
///
/// Dropping an uncommitted stage removes whatever partial files it wrote, so a failed run never
/// leaves outputs that look usable.
#[derive(Debug)]
pub struct OutputStage {
    paths: OutputPaths,
    written: Vec<PathBuf>,
    committed: bool,
}

impl OutputStage {
    /// Prepares a stage under `dir`, creating the directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| PipelineError::io(dir, err))?;
        Ok(Self {
            paths: OutputPaths::in_dir(dir),
            written: Vec::new(),
            committed: false,
        })
    }

    /// Final paths the stage commits to.
    #[must_use]
    pub const fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Stages the labeled dataset.
    pub fn stage_labeled(&mut self, table: &LabeledTable) -> Result<()> {
        let partial = partial_path(&self.paths.labeled_dataset);
        self.written.push(partial.clone());
        table.write_csv(&partial)
    }

    /// Stages the three fitted artifacts.
    pub fn stage_baseline(&mut self, baseline: &TrainedBaseline) -> Result<()> {
        let model = partial_path(&self.paths.model);
        self.written.push(model.clone());
        save_artifact(&model, &baseline.model)?;
        let vectorizer = partial_path(&self.paths.vectorizer);
        self.written.push(vectorizer.clone());
        save_artifact(&vectorizer, &baseline.vectorizer)?;
        let scaler = partial_path(&self.paths.scaler);
        self.written.push(scaler.clone());
        save_artifact(&scaler, &baseline.scaler)
    }

    /// Renames every staged file into place. Fails unless all four outputs were staged.
    ///
    /// Outputs of an earlier run are moved aside first. If any rename fails, the files already
    /// placed are removed and the earlier outputs are restored.
    pub fn commit(mut self) -> Result<OutputPaths> {
        let missing = self
            .paths
            .all()
            .into_iter()
            .find(|path| !self.written.contains(&partial_path(path)));
        if let Some(path) = missing {
            return Err(PipelineError::InvalidConfig(format!(
                "output {} was never staged",
                path.display()
            )));
        }
        let mut moved_aside = Vec::new();
        let mut placed = Vec::new();
        match self.swap_in(&mut moved_aside, &mut placed) {
            Ok(()) => {
                for (_, previous) in &moved_aside {
                    let _ = fs::remove_file(previous);
                }
                self.committed = true;
                Ok(self.paths.clone())
            }
            Err(err) => {
                for path in placed.iter().rev() {
                    let _ = fs::remove_file(path);
                }
                for (path, previous) in moved_aside.iter().rev() {
                    let _ = fs::rename(previous, path);
                }
                Err(err)
            }
        }
    }

    fn swap_in(
        &self,
        moved_aside: &mut Vec<(PathBuf, PathBuf)>,
        placed: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let targets = self.paths.all();
        if let Some(path) = targets.iter().find(|path| path.is_dir()) {
            return Err(PipelineError::io(
                *path,
                io::Error::new(io::ErrorKind::AlreadyExists, "a directory occupies the output path"),
            ));
        }
        for path in targets {
            if path.exists() {
                let previous = suffixed(path, PREVIOUS_SUFFIX);
                fs::rename(path, &previous).map_err(|err| PipelineError::io(path, err))?;
                moved_aside.push((path.to_path_buf(), previous));
            }
        }
        for path in targets {
            fs::rename(partial_path(path), path).map_err(|err| PipelineError::io(path, err))?;
            placed.push(path.to_path_buf());
        }
        Ok(())
    }
}

impl Drop for OutputStage {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for partial in &self.written {
            let _ = fs::remove_file(partial);
        }
    }
}

/// Scores new catalog entries with persisted artifacts.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    model: LogisticRegression,
    vectorizer: TfidfVectorizer,
    scaler: StandardScaler,
}

impl QualityScorer {
    /// Loads the three artifacts from an output directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let paths = OutputPaths::in_dir(dir.as_ref());
        Ok(Self {
            model: load_artifact(&paths.model)?,
            vectorizer: load_artifact(&paths.vectorizer)?,
            scaler: load_artifact(&paths.scaler)?,
        })
    }

    /// Wraps artifacts that are already in memory.
    #[must_use]
    pub fn from_baseline(baseline: &TrainedBaseline) -> Self {
        Self {
            model: baseline.model.clone(),
            vectorizer: baseline.vectorizer.clone(),
            scaler: baseline.scaler,
        }
    }

    fn features(&self, catalog_content: &str, price: f64) -> FeatureMatrix {
        FeatureMatrix::combine(
            vec![self.vectorizer.transform_one(catalog_content)],
            &[self.scaler.transform_one(price)],
            self.vectorizer.len(),
        )
    }

    /// Predicted quality label.
    #[must_use]
    pub fn predict(&self, catalog_content: &str, price: f64) -> QualityLabel {
        let x = self.features(catalog_content, price);
        self.model.predict_row(&x.rows()[0])
    }

    /// Probability per label the classifier was trained on.
    #[must_use]
    pub fn predict_proba(&self, catalog_content: &str, price: f64) -> Vec<(QualityLabel, f64)> {
        let x = self.features(catalog_content, price);
        self.model
            .classes()
            .iter()
            .copied()
            .zip(self.model.predict_row_proba(&x.rows()[0]))
            .collect()
    }
}
