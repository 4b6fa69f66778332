use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Zero-mean, unit-variance scaling of the price column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    /// Fits on training prices (population standard deviation).
    ///
    /// Constant prices make scaling undefined and are reported rather than patched.
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "cannot fit a price scaler on zero rows".into(),
            ));
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let scale = variance.sqrt();
        if scale <= f64::EPSILON * mean.abs().max(1.0) {
            return Err(PipelineError::ZeroPriceVariance { value: mean });
        }
        Ok(Self { mean, scale })
    }

    /// Scales one value with the fitted parameters.
    #[must_use]
    pub fn transform_one(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }

    /// Scales a column with the fitted parameters.
    #[must_use]
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform_one(*v)).collect()
    }

    /// Fitted mean.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Fitted standard deviation.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }
}
