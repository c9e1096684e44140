//! Out-of-bag (OOB) evaluation for Random Forest regression.

use crate::error::RfError;
use crate::metrics::RegressionMetrics;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OobScore {
    /// Mean squared error of OOB predictions.
    pub mse: f64,
    /// Coefficient of determination of OOB predictions.
    pub r2: f64,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
}

/// Compute out-of-bag predictions and score them.
///
/// Each sample is predicted by the mean of the trees whose bootstrap did
/// not contain it. Samples with no OOB tree are skipped.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    features: &[Vec<f64>],
    labels: &[f64],
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<OobScore, RfError> {
    let n_samples = features.len();
    let mut sums = vec![0.0f64; n_samples];
    let mut counts = vec![0usize; n_samples];

    for (tree, oob_indices) in trees.iter().zip(oob_indices_per_tree) {
        for &sample_idx in oob_indices {
            sums[sample_idx] += tree.predict(&features[sample_idx])?;
            counts[sample_idx] += 1;
        }
    }

    let (oob_labels, oob_predictions): (Vec<f64>, Vec<f64>) = (0..n_samples)
        .filter(|&i| counts[i] > 0)
        .map(|i| (labels[i], sums[i] / counts[i] as f64))
        .unzip();

    if oob_labels.is_empty() {
        return Err(RfError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    let metrics = RegressionMetrics::compute(&oob_labels, &oob_predictions)?;
    Ok(OobScore {
        mse: metrics.mse,
        r2: metrics.r2,
        n_oob_samples: oob_labels.len(),
    })
}
