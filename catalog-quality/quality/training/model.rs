use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::features::FeatureMatrix;
use crate::{
    error::{PipelineError, Result},
    labeling::{reporter::LabelDistribution, scores::QualityLabel},
};

/// Per-class sample weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// `n / (k * count_c)`, countering label imbalance.
    #[default]
    Balanced,
    /// Every sample weighs 1.
    Uniform,
}

/// Logistic regression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Inverse L2 regularisation strength.
    pub c: f64,
    /// Gradient step budget.
    pub max_iter: usize,
    /// Stop once every gradient component is below this magnitude.
    pub tol: f64,
    /// Class weighting scheme.
    pub class_weight: ClassWeight,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            class_weight: ClassWeight::Balanced,
        }
    }
}

impl ClassifierConfig {
    /// Rejects non-positive regularisation or an empty step budget.
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!("c must be positive, got {}", self.c)));
        }
        if self.max_iter == 0 {
            return Err(PipelineError::InvalidConfig("max_iter must be positive".into()));
        }
        Ok(())
    }
}

/// Multinomial logistic regression with an unpenalised intercept.
///
/// Minimises `sum_i w_i * CE_i + ||W||^2 / (2C)` with accelerated full-batch gradient descent.
/// The step size comes from a Lipschitz bound on the loss, so no learning rate is tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<QualityLabel>,
    weights: Array2<f64>,
    intercept: Array1<f64>,
    n_iter: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fits on the combined training matrix.
    pub fn fit(config: &ClassifierConfig, x: &FeatureMatrix, y: &[QualityLabel]) -> Result<Self> {
        config.validate()?;
        let distribution = LabelDistribution::from_labels(y.iter().copied());
        if distribution.present() < 2 {
            return Err(PipelineError::TooFewClasses {
                found: distribution.present(),
            });
        }
        let classes: Vec<QualityLabel> = QualityLabel::ALL
            .into_iter()
            .filter(|label| distribution.count(*label) > 0)
            .collect();
        let k = classes.len();
        let n = y.len() as f64;
        let targets: Vec<usize> = y
            .iter()
            .map(|label| classes.iter().position(|c| c == label).unwrap_or_default())
            .collect();
        let sample_weight: Vec<f64> = y
            .iter()
            .map(|label| match config.class_weight {
                ClassWeight::Balanced => n / (k as f64 * distribution.count(*label) as f64),
                ClassWeight::Uniform => 1.0,
            })
            .collect();

        let penalty = 1.0 / (config.c * n);
        let lipschitz = 0.5
            * x.rows()
                .iter()
                .zip(&sample_weight)
                .map(|(row, w)| w * (1.0 + row.iter().map(|(_, v)| v * v).sum::<f64>()))
                .sum::<f64>()
            / n
            + penalty;
        let step = 1.0 / lipschitz;

        let mut model = Self {
            classes,
            weights: Array2::zeros((x.n_features(), k)),
            intercept: Array1::zeros(k),
            n_iter: 0,
            converged: false,
        };
        let mut previous = model.clone();
        let mut t = 1.0_f64;
        for iter in 1..=config.max_iter {
            let t_next = (1.0 + 4.0f64.mul_add(t * t, 1.0).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            let look_w = &model.weights + &((&model.weights - &previous.weights) * momentum);
            let look_b = &model.intercept + &((&model.intercept - &previous.intercept) * momentum);
            let lookahead = Self {
                weights: look_w,
                intercept: look_b,
                ..model.clone()
            };

            let (grad_w, grad_b) = lookahead.gradient(x, &targets, &sample_weight, penalty);
            let max_grad = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0_f64, |acc, g| acc.max(g.abs()));
            let weights = &lookahead.weights - &(grad_w * step);
            let intercept = &lookahead.intercept - &(grad_b * step);
            previous = model;
            model = Self {
                weights,
                intercept,
                n_iter: iter,
                ..lookahead
            };
            t = t_next;
            if max_grad < config.tol {
                model.converged = true;
                break;
            }
        }
        Ok(model)
    }

    fn gradient(
        &self,
        x: &FeatureMatrix,
        targets: &[usize],
        sample_weight: &[f64],
        penalty: f64,
    ) -> (Array2<f64>, Array1<f64>) {
        let n = targets.len() as f64;
        let mut grad_w = &self.weights * penalty;
        let mut grad_b: Array1<f64> = Array1::zeros(self.classes.len());
        for ((row, &target), &weight) in x.rows().iter().zip(targets).zip(sample_weight) {
            let mut residual = self.row_proba(row);
            residual[target] -= 1.0;
            residual *= weight / n;
            for &(column, value) in row {
                let mut slot = grad_w.row_mut(column);
                slot.scaled_add(value, &residual);
            }
            grad_b += &residual;
        }
        (grad_w, grad_b)
    }

    fn row_proba(&self, row: &[(usize, f64)]) -> Array1<f64> {
        let mut logits = self.intercept.clone();
        for &(column, value) in row {
            logits.scaled_add(value, &self.weights.row(column));
        }
        let max = logits.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
        logits.mapv_inplace(|v| (v - max).exp());
        let total = logits.sum();
        logits / total
    }

    /// Class probabilities, one row per sample, columns in [`Self::classes`] order.
    #[must_use]
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Array2<f64> {
        let mut out = Array2::zeros((x.len(), self.classes.len()));
        for (mut slot, row) in out.axis_iter_mut(Axis(0)).zip(x.rows()) {
            slot.assign(&self.row_proba(row));
        }
        out
    }

    /// Most probable label per sample.
    #[must_use]
    pub fn predict(&self, x: &FeatureMatrix) -> Vec<QualityLabel> {
        x.rows().iter().map(|row| self.predict_row(row)).collect()
    }

    /// Most probable label for one sparse row; ties resolve to the lower label.
    #[must_use]
    pub fn predict_row(&self, row: &[(usize, f64)]) -> QualityLabel {
        let proba = self.row_proba(row);
        let mut best = 0;
        for (idx, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = idx;
            }
        }
        self.classes[best]
    }

    /// Probability vector for one sparse row.
    #[must_use]
    pub fn predict_row_proba(&self, row: &[(usize, f64)]) -> Vec<f64> {
        self.row_proba(row).to_vec()
    }

    /// Labels seen during training, ascending.
    #[must_use]
    pub fn classes(&self) -> &[QualityLabel] {
        &self.classes
    }

    /// Coefficients, shape `(n_features, n_classes)`.
    #[must_use]
    pub const fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Gradient steps taken.
    #[must_use]
    pub const fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Whether the gradient fell below the tolerance before the step budget ran out.
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (FeatureMatrix, Vec<QualityLabel>) {
        let mut rows = Vec::new();
        let mut prices = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let (column, label) = match i % 3 {
                0 => (0, QualityLabel::Low),
                1 => (1, QualityLabel::Medium),
                _ => (2, QualityLabel::High),
            };
            rows.push(vec![(column, 1.0)]);
            prices.push(f64::from(i % 5) / 5.0 - 0.4);
            labels.push(label);
        }
        (FeatureMatrix::combine(rows, &prices, 3), labels)
    }

    #[test]
    fn learns_separable_classes() {
        let (x, y) = toy();
        let model = LogisticRegression::fit(&ClassifierConfig::default(), &x, &y).unwrap();
        assert_eq!(model.predict(&x), y);
        assert_eq!(model.classes(), &QualityLabel::ALL);
        assert_eq!(model.weights().dim(), (4, 3));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (x, y) = toy();
        let model = LogisticRegression::fit(&ClassifierConfig::default(), &x, &y).unwrap();
        let proba = model.predict_proba(&x);
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn converges_on_easy_problem() {
        let (x, y) = toy();
        let config = ClassifierConfig {
            max_iter: 5000,
            ..ClassifierConfig::default()
        };
        let model = LogisticRegression::fit(&config, &x, &y).unwrap();
        assert!(model.converged());
        assert!(model.n_iter() < 5000);
    }

    #[test]
    fn balanced_weights_help_minority_class() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let label = if i < 4 { QualityLabel::High } else { QualityLabel::Low };
            let value = if label == QualityLabel::High { 1.0 } else { 0.2 };
            rows.push(vec![(0, value)]);
            labels.push(label);
        }
        let x = FeatureMatrix::combine(rows, &[0.0; 40], 1);
        let model = LogisticRegression::fit(&ClassifierConfig::default(), &x, &labels).unwrap();
        assert_eq!(model.predict_row(&[(0, 1.0)]), QualityLabel::High);
        assert_eq!(model.predict_row(&[(0, 0.2)]), QualityLabel::Low);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = FeatureMatrix::combine(vec![Vec::new(); 3], &[0.0, 1.0, 2.0], 0);
        let err = LogisticRegression::fit(&ClassifierConfig::default(), &x, &[QualityLabel::Low; 3])
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooFewClasses { found: 1 }));
    }
}
