//! Histogram-based splitting for regression trees.
//!
//! Quantile bin edges are computed once per tree. Each node then bins its
//! samples in O(n), accumulates per-bin label statistics, and scans the
//! O(B) bin boundaries instead of sorting every candidate feature.

use crate::node::FeatureIndex;
use crate::split::{LabelStats, SplitCandidate, sse_decrease};

/// Pre-computed quantile bin edges for all features.
#[derive(Debug, Clone)]
pub(crate) struct FeatureBins {
    /// Bin edges per feature. Values <= edges[0] fall in bin 0, values in
    /// (edges[i-1], edges[i]] fall in bin i, larger values in the last bin.
    edges: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Build quantile-based bin edges from column-major features.
    ///
    /// Features whose values are all identical get no edges and are never split.
    pub(crate) fn build(col_features: &[Vec<f64>], n_bins: usize) -> Self {
        let edges = col_features
            .iter()
            .map(|col| quantile_edges(col, n_bins))
            .collect();
        Self { edges }
    }

    /// Return the bin index for `value` in feature `feat_idx`.
    pub(crate) fn bin_index(&self, feat_idx: usize, value: f64) -> usize {
        self.edges[feat_idx].partition_point(|&e| e < value)
    }

    /// Number of bins for a feature, or 0 if the feature is constant.
    pub(crate) fn n_bins_for_feature(&self, feat_idx: usize) -> usize {
        match self.edges[feat_idx].len() {
            0 => 0,
            n_edges => n_edges + 1,
        }
    }

    /// Threshold for a split placing bins `0..=bin_idx` on the left.
    pub(crate) fn threshold(&self, feat_idx: usize, bin_idx: usize) -> f64 {
        self.edges[feat_idx][bin_idx]
    }
}

fn quantile_edges(col: &[f64], n_bins: usize) -> Vec<f64> {
    if col.is_empty() {
        return Vec::new();
    }

    let mut sorted = col.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let (lo_val, hi_val) = (sorted[0], sorted[n - 1]);
    if lo_val == hi_val {
        return Vec::new();
    }

    // Linear interpolation at 1/n_bins, 2/n_bins, ..., (n_bins-1)/n_bins.
    let mut edges: Vec<f64> = (1..n_bins)
        .map(|k| {
            let pos = (k as f64 / n_bins as f64) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        })
        .collect();

    edges.dedup_by(|a, b| *a == *b);
    // An edge at the minimum or maximum would leave one side empty.
    edges.retain(|&e| e > lo_val && e < hi_val);
    if edges.is_empty() {
        // Few distinct values: fall back to the midpoint of the range.
        edges.push((lo_val + hi_val) / 2.0);
    }
    edges
}

/// Find the best split by scanning bin boundaries of the selected features.
pub(crate) fn find_histogram_split(
    col_features: &[Vec<f64>],
    labels: &[f64],
    sample_indices: &[usize],
    parent: &LabelStats,
    selected: &[usize],
    bins: &FeatureBins,
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;
    let mut best_decrease = 0.0;

    for &feat_idx in selected {
        let actual_bins = bins.n_bins_for_feature(feat_idx);
        if actual_bins == 0 {
            continue;
        }

        let feat_col = &col_features[feat_idx];
        let mut bin_stats = vec![LabelStats::default(); actual_bins];
        for &si in sample_indices {
            let bin = bins.bin_index(feat_idx, feat_col[si]).min(actual_bins - 1);
            bin_stats[bin].push(labels[si]);
        }

        // Split at boundary b sends bins 0..=b left.
        let mut left = LabelStats::default();
        for (split_bin, stats) in bin_stats.iter().enumerate().take(actual_bins - 1) {
            left.add(stats);
            let mut right = *parent;
            right.sub(&left);

            if left.count < min_samples_leaf.max(1) || right.count < min_samples_leaf.max(1) {
                continue;
            }

            let decrease = sse_decrease(parent, &left, &right);
            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some(SplitCandidate {
                    feature: FeatureIndex::new(feat_idx),
                    threshold: bins.threshold(feat_idx, split_bin),
                    decrease,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::split::{SplitMethod, find_split};

    use super::FeatureBins;

    #[test]
    fn bins_build_correct_edges() {
        let col = vec![(0..100).map(f64::from).collect::<Vec<f64>>()];
        let bins = FeatureBins::build(&col, 4);
        assert_eq!(bins.n_bins_for_feature(0), 4);
        assert!((bins.threshold(0, 0) - 24.75).abs() < 1e-9);
        assert!((bins.threshold(0, 1) - 49.5).abs() < 1e-9);
        assert!((bins.threshold(0, 2) - 74.25).abs() < 1e-9);
    }

    #[test]
    fn bin_index_correctness() {
        let col = vec![(0..100).map(f64::from).collect::<Vec<f64>>()];
        let bins = FeatureBins::build(&col, 4);
        assert_eq!(bins.bin_index(0, 0.0), 0);
        assert_eq!(bins.bin_index(0, 24.75), 0);
        assert_eq!(bins.bin_index(0, 25.0), 1);
        assert_eq!(bins.bin_index(0, 99.0), 3);
    }

    #[test]
    fn constant_feature_has_no_bins() {
        let bins = FeatureBins::build(&[vec![2.0; 10]], 8);
        assert_eq!(bins.n_bins_for_feature(0), 0);
    }

    #[test]
    fn skewed_feature_falls_back_to_midpoint() {
        // Every interpolated quantile lands on the minimum.
        let mut col = vec![1.0; 9];
        col.push(9.0);
        let bins = FeatureBins::build(&[col], 2);
        assert_eq!(bins.n_bins_for_feature(0), 2);
        assert!((bins.threshold(0, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn histogram_matches_exact_on_step() {
        let features = vec![(1..=20).map(f64::from).collect::<Vec<f64>>()];
        let labels: Vec<f64> = (1..=20).map(|p| if p <= 10 { 20.0 } else { 1.0 }).collect();
        let indices: Vec<usize> = (0..20).collect();
        let bins = FeatureBins::build(&features, 4);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let hist = find_split(
            &features,
            &labels,
            &indices,
            SplitMethod::Histogram { n_bins: 4 },
            Some(&bins),
            1,
            1,
            &mut rng,
        )
        .expect("histogram split exists");

        let exact = find_split(
            &features,
            &labels,
            &indices,
            SplitMethod::Exact,
            None,
            1,
            1,
            &mut rng,
        )
        .expect("exact split exists");

        assert_eq!(hist.left_indices, exact.left_indices);
        assert!((hist.impurity_decrease - exact.impurity_decrease).abs() < 1e-9);
    }
}
