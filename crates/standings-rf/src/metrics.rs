//! Regression evaluation metrics.
//!
//! All metrics compare a label vector with a prediction vector of the same
//! length. Sums are accumulated in `f64` in input order.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::RfError;

/// A named regression metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionMetric {
    /// Root mean squared error: `sqrt(mean((y - ŷ)²))`.
    Rmse,
    /// Mean squared error: `mean((y - ŷ)²)`.
    Mse,
    /// Mean absolute error: `mean(|y - ŷ|)`.
    Mae,
    /// Coefficient of determination: `1 - SSE / SST`.
    R2,
    /// Explained variance: `sum((ŷ - ȳ)²) / n`.
    Var,
}

impl RegressionMetric {
    /// Every metric, in the order they are reported.
    pub const ALL: [RegressionMetric; 5] = [
        RegressionMetric::Rmse,
        RegressionMetric::Mse,
        RegressionMetric::Mae,
        RegressionMetric::R2,
        RegressionMetric::Var,
    ];

    /// Short lowercase name used as the tracked metric key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RegressionMetric::Rmse => "rmse",
            RegressionMetric::Mse => "mse",
            RegressionMetric::Mae => "mae",
            RegressionMetric::R2 => "r2",
            RegressionMetric::Var => "var",
        }
    }

    /// Whether a larger value means a better model.
    #[must_use]
    pub fn higher_is_better(self) -> bool {
        matches!(self, RegressionMetric::R2 | RegressionMetric::Var)
    }
}

impl fmt::Display for RegressionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegressionMetric {
    type Err = RfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lowered)
            .ok_or_else(|| RfError::UnknownMetric { name: s.to_string() })
    }
}

/// Evaluates one [`RegressionMetric`] over label/prediction pairs.
#[derive(Debug, Clone, Copy)]
pub struct RegressionEvaluator {
    metric: RegressionMetric,
}

impl RegressionEvaluator {
    /// Create an evaluator for `metric`.
    #[must_use]
    pub fn new(metric: RegressionMetric) -> Self {
        Self { metric }
    }

    /// Return the configured metric.
    #[must_use]
    pub fn metric(&self) -> RegressionMetric {
        self.metric
    }

    /// Compute the configured metric.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                  |
    /// |---------------------------------------|---------------------------------------|
    /// | [`RfError::EmptyEvaluation`]          | `labels` is empty                     |
    /// | [`RfError::EvaluationLengthMismatch`] | `labels.len() != predictions.len()`   |
    pub fn evaluate(&self, labels: &[f64], predictions: &[f64]) -> Result<f64, RfError> {
        let metrics = RegressionMetrics::compute(labels, predictions)?;
        Ok(metrics.get(self.metric))
    }
}

/// All regression metrics for one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegressionMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean squared error.
    pub mse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
    /// Explained variance.
    pub var: f64,
    /// Number of evaluated pairs.
    pub count: usize,
}

impl RegressionMetrics {
    /// Compute every metric in a single pass over the pairs.
    ///
    /// When all labels are equal, `r2` is 1.0 for a perfect fit and 0.0
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`RegressionEvaluator::evaluate`].
    pub fn compute(labels: &[f64], predictions: &[f64]) -> Result<Self, RfError> {
        if labels.len() != predictions.len() {
            return Err(RfError::EvaluationLengthMismatch {
                n_labels: labels.len(),
                n_predictions: predictions.len(),
            });
        }
        if labels.is_empty() {
            return Err(RfError::EmptyEvaluation);
        }

        let n = labels.len() as f64;
        let label_mean = labels.iter().sum::<f64>() / n;

        let mut sse = 0.0f64;
        let mut sae = 0.0f64;
        let mut sst = 0.0f64;
        let mut ssr = 0.0f64;
        for (&y, &y_hat) in labels.iter().zip(predictions) {
            let err = y - y_hat;
            sse += err * err;
            sae += err.abs();
            sst += (y - label_mean).powi(2);
            ssr += (y_hat - label_mean).powi(2);
        }

        let mse = sse / n;
        let r2 = if sst > 0.0 {
            1.0 - sse / sst
        } else if sse == 0.0 {
            1.0
        } else {
            0.0
        };

        let metrics = Self {
            rmse: mse.sqrt(),
            mse,
            mae: sae / n,
            r2,
            var: ssr / n,
            count: labels.len(),
        };
        debug!(
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            count = metrics.count,
            "regression metrics computed"
        );
        Ok(metrics)
    }

    /// Return the value of one metric.
    #[must_use]
    pub fn get(&self, metric: RegressionMetric) -> f64 {
        match metric {
            RegressionMetric::Rmse => self.rmse,
            RegressionMetric::Mse => self.mse,
            RegressionMetric::Mae => self.mae,
            RegressionMetric::R2 => self.r2,
            RegressionMetric::Var => self.var,
        }
    }
}
