//! Descriptive statistics for the numeric columns of a frame.

use crate::IoError;
use crate::frame::Frame;

/// Statistics for one numeric column.
///
/// Percentiles are the smallest observed value with at least that share of
/// the column at or below it, so they are always values that occur in the
/// data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ColumnSummary {
    /// Column name.
    pub column: String,
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation; `None` for a single value.
    pub stddev: Option<f64>,
    /// Smallest value.
    pub min: f64,
    /// 25th percentile.
    #[serde(rename = "25%")]
    pub p25: f64,
    /// Median.
    #[serde(rename = "50%")]
    pub p50: f64,
    /// 75th percentile.
    #[serde(rename = "75%")]
    pub p75: f64,
    /// Largest value.
    pub max: f64,
}

impl Frame {
    /// Summarize every numeric column; text columns are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EmptyFrame`] when the frame has no rows.
    pub fn summary(&self) -> Result<Vec<ColumnSummary>, IoError> {
        if self.n_rows() == 0 {
            return Err(IoError::EmptyFrame {
                operation: "summarize",
            });
        }
        Ok(self
            .columns()
            .filter_map(|(name, column)| column.to_f64().map(|values| summarize(name, values)))
            .collect())
    }
}

fn summarize(name: &str, mut values: Vec<f64>) -> ColumnSummary {
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let stddev = (n > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    });

    values.sort_unstable_by(f64::total_cmp);
    let percentile = |p: f64| {
        let rank = (p * n as f64).ceil() as usize;
        values[rank.clamp(1, n) - 1]
    };

    ColumnSummary {
        column: name.to_string(),
        count: n,
        mean,
        stddev,
        min: values[0],
        p25: percentile(0.25),
        p50: percentile(0.5),
        p75: percentile(0.75),
        max: values[n - 1],
    }
}
