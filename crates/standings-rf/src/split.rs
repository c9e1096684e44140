use rand::Rng;

use crate::histogram::{FeatureBins, find_histogram_split};
use crate::node::{FeatureIndex, Impurity};

/// Strategy for choosing split thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMethod {
    /// Sort each candidate feature and evaluate every boundary between distinct values.
    Exact,
    /// Draw one uniform threshold per candidate feature (extremely randomized trees).
    ExtraTrees,
    /// Quantile-bin each feature once, then evaluate only bin boundaries.
    Histogram {
        /// Maximum number of bins per feature.
        n_bins: usize,
    },
}

/// Running statistics of a set of regression labels.
///
/// Stores count, mean and the summed squared deviation (`m2`) in Welford
/// form, so samples and whole groups move between the two sides of a
/// candidate split in O(1) without the cancellation of a raw sum of squares.
/// Shifting every label by a constant leaves `m2` unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LabelStats {
    pub(crate) count: usize,
    mean: f64,
    m2: f64,
}

impl LabelStats {
    pub(crate) fn from_indices(labels: &[f64], sample_indices: &[usize]) -> Self {
        let mut stats = Self::default();
        for &si in sample_indices {
            stats.push(labels[si]);
        }
        stats
    }

    pub(crate) fn push(&mut self, y: f64) {
        self.count += 1;
        let delta = y - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (y - self.mean);
    }

    pub(crate) fn remove(&mut self, y: f64) {
        if self.count <= 1 {
            *self = Self::default();
            return;
        }
        self.count -= 1;
        let reduced_mean = self.mean - (y - self.mean) / self.count as f64;
        self.m2 = (self.m2 - (y - reduced_mean) * (y - self.mean)).max(0.0);
        self.mean = reduced_mean;
    }

    pub(crate) fn add(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n = (self.count + other.count) as f64;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / n;
        self.m2 += other.m2 + delta * delta * self.count as f64 * other.count as f64 / n;
        self.count += other.count;
    }

    pub(crate) fn sub(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count <= other.count {
            *self = Self::default();
            return;
        }
        let total = self.count as f64;
        let rest = (self.count - other.count) as f64;
        let rest_mean = self.mean + (self.mean - other.mean) * other.count as f64 / rest;
        let delta = other.mean - rest_mean;
        self.m2 = (self.m2 - other.m2 - delta * delta * rest * other.count as f64 / total).max(0.0);
        self.mean = rest_mean;
        self.count -= other.count;
    }

    /// Mean label, or 0.0 for an empty set.
    pub(crate) fn mean(&self) -> f64 {
        self.mean
    }

    /// Summed squared deviation from the mean.
    pub(crate) fn sse(&self) -> f64 {
        self.m2
    }

    /// Population variance of the labels.
    pub(crate) fn variance(&self) -> Impurity {
        if self.count == 0 {
            return Impurity::new(0.0);
        }
        Impurity::new(self.m2 / self.count as f64)
    }

    /// True when every label is the same.
    ///
    /// Identical labels never move the running mean, so `m2` stays exactly
    /// zero for them regardless of magnitude.
    pub(crate) fn is_constant(&self) -> bool {
        self.m2 <= 0.0
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Decrease in summed squared error from this split.
    pub(crate) impurity_decrease: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Best (feature, threshold) found by one of the search strategies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitCandidate {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    pub(crate) decrease: f64,
}

/// SSE decrease for a parent split into `left` and `right`.
pub(crate) fn sse_decrease(parent: &LabelStats, left: &LabelStats, right: &LabelStats) -> f64 {
    parent.sse() - left.sse() - right.sse()
}

/// Pick `max_features` distinct feature indices with a partial Fisher-Yates shuffle.
pub(crate) fn select_features(
    n_features: usize,
    max_features: usize,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }
    feature_order.truncate(take);
    feature_order
}

/// Find the best split for the samples reaching a node.
///
/// `col_features` is column-major: `col_features[feature_idx][sample_idx]`.
/// `sample_indices` index into the inner vectors and into `labels`.
///
/// Returns `None` when no split reduces the squared error while leaving at
/// least `min_samples_leaf` samples on each side.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_split(
    col_features: &[Vec<f64>],
    labels: &[f64],
    sample_indices: &[usize],
    split_method: SplitMethod,
    bins: Option<&FeatureBins>,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = col_features.len();
    if sample_indices.is_empty() || n_features == 0 {
        return None;
    }

    let parent = LabelStats::from_indices(labels, sample_indices);
    let selected = select_features(n_features, max_features, rng);

    let candidate = match (split_method, bins) {
        (SplitMethod::Histogram { .. }, Some(bins)) => find_histogram_split(
            col_features,
            labels,
            sample_indices,
            &parent,
            &selected,
            bins,
            min_samples_leaf,
        ),
        (SplitMethod::ExtraTrees, _) => find_random_split(
            col_features,
            labels,
            sample_indices,
            &parent,
            &selected,
            min_samples_leaf,
            rng,
        ),
        _ => find_exact_split(
            col_features,
            labels,
            sample_indices,
            &parent,
            &selected,
            min_samples_leaf,
        ),
    }?;

    Some(partition(col_features, sample_indices, candidate))
}

/// Exhaustive search over every boundary between distinct sorted values.
fn find_exact_split(
    col_features: &[Vec<f64>],
    labels: &[f64],
    sample_indices: &[usize],
    parent: &LabelStats,
    selected: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n_samples = sample_indices.len();
    let mut best: Option<SplitCandidate> = None;
    let mut best_decrease = 0.0;

    for &feat_idx in selected {
        let feat_col = &col_features[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], si))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        // Left grows from empty, right shrinks from the parent.
        let mut left = LabelStats::default();
        let mut right = *parent;

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let y = labels[si];
            left.push(y);
            right.remove(y);

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }
            if left.count < min_samples_leaf || right.count < min_samples_leaf {
                continue;
            }

            let decrease = sse_decrease(parent, &left, &right);
            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some(SplitCandidate {
                    feature: FeatureIndex::new(feat_idx),
                    threshold: (val_i + val_next) / 2.0,
                    decrease,
                });
            }
        }
    }

    best
}

/// One uniformly drawn threshold per selected feature.
fn find_random_split(
    col_features: &[Vec<f64>],
    labels: &[f64],
    sample_indices: &[usize],
    parent: &LabelStats,
    selected: &[usize],
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;
    let mut best_decrease = 0.0;

    for &feat_idx in selected {
        let feat_col = &col_features[feat_idx];

        let (min, max) = sample_indices.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &si| (lo.min(feat_col[si]), hi.max(feat_col[si])),
        );
        if min >= max {
            continue;
        }

        // min <= threshold < max, so both sides are non-empty.
        let threshold = rng.gen_range(min..max);

        let mut left = LabelStats::default();
        for &si in sample_indices {
            if feat_col[si] <= threshold {
                left.push(labels[si]);
            }
        }
        let mut right = *parent;
        right.sub(&left);

        if left.count < min_samples_leaf || right.count < min_samples_leaf {
            continue;
        }

        let decrease = sse_decrease(parent, &left, &right);
        if decrease > best_decrease {
            best_decrease = decrease;
            best = Some(SplitCandidate {
                feature: FeatureIndex::new(feat_idx),
                threshold,
                decrease,
            });
        }
    }

    best
}

/// Partition `sample_indices` by the candidate's feature and threshold.
fn partition(
    col_features: &[Vec<f64>],
    sample_indices: &[usize],
    candidate: SplitCandidate,
) -> SplitResult {
    let feat_col = &col_features[candidate.feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| feat_col[si] <= candidate.threshold);

    SplitResult {
        feature: candidate.feature,
        threshold: candidate.threshold,
        impurity_decrease: candidate.decrease,
        left_indices,
        right_indices,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{LabelStats, SplitMethod, find_split, select_features};

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<usize>) {
        // Column-major, one feature: positions 1..=6, points drop after 3.
        let features = vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]];
        let labels = vec![25.0, 25.0, 25.0, 2.0, 2.0, 2.0];
        let indices = (0..6).collect();
        (features, labels, indices)
    }

    #[test]
    fn label_stats_variance() {
        let stats = LabelStats::from_indices(&[1.0, 2.0, 3.0, 4.0], &[0, 1, 2, 3]);
        assert_eq!(stats.count, 4);
        assert!((stats.mean() - 2.5).abs() < 1e-12);
        assert!((stats.variance().value() - 1.25).abs() < 1e-12);
        assert!((stats.sse() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn label_stats_constant() {
        let stats = LabelStats::from_indices(&[7.0, 7.0, 7.0], &[0, 1, 2]);
        assert!(stats.is_constant());
        let stats = LabelStats::from_indices(&[7.0, 7.5], &[0, 1]);
        assert!(!stats.is_constant());
    }

    #[test]
    fn label_stats_ignore_offset() {
        let labels = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let shifted: Vec<f64> = labels.iter().map(|y| y + 1e7).collect();
        let idx: Vec<usize> = (0..labels.len()).collect();
        let base = LabelStats::from_indices(&labels, &idx);
        let big = LabelStats::from_indices(&shifted, &idx);
        assert!(!big.is_constant());
        assert!((base.sse() - 1.5).abs() < 1e-12);
        assert!((big.sse() - base.sse()).abs() < 1e-6);
        assert!((big.mean() - (1e7 + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn label_stats_move_between_sides() {
        let labels = [3.0, 9.0, 4.0, 1.0, 7.0];
        let all = LabelStats::from_indices(&labels, &[0, 1, 2, 3, 4]);

        let mut left = LabelStats::from_indices(&labels, &[0, 1]);
        let right = LabelStats::from_indices(&labels, &[2, 3, 4]);
        left.add(&right);
        assert_eq!(left.count, 5);
        assert!((left.mean() - all.mean()).abs() < 1e-12);
        assert!((left.sse() - all.sse()).abs() < 1e-9);

        let mut rest = all;
        rest.sub(&right);
        let expected = LabelStats::from_indices(&labels, &[0, 1]);
        assert!((rest.mean() - expected.mean()).abs() < 1e-12);
        assert!((rest.sse() - expected.sse()).abs() < 1e-9);

        let mut shrinking = all;
        shrinking.remove(7.0);
        let expected = LabelStats::from_indices(&labels, &[0, 1, 2, 3]);
        assert!((shrinking.mean() - expected.mean()).abs() < 1e-12);
        assert!((shrinking.sse() - expected.sse()).abs() < 1e-9);
        for y in [1.0, 4.0, 9.0, 3.0] {
            shrinking.remove(y);
        }
        assert_eq!(shrinking, LabelStats::default());
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = LabelStats::default();
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.sse(), 0.0);
    }

    #[test]
    fn select_features_distinct_and_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut chosen = select_features(10, 4, &mut rng);
        assert_eq!(chosen.len(), 4);
        chosen.sort_unstable();
        chosen.dedup();
        assert_eq!(chosen.len(), 4);
        assert!(chosen.iter().all(|&f| f < 10));
    }

    #[test]
    fn exact_finds_step_boundary() {
        let (features, labels, indices) = step_data();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let split = find_split(
            &features,
            &labels,
            &indices,
            SplitMethod::Exact,
            None,
            1,
            1,
            &mut rng,
        )
        .expect("split exists");
        assert_eq!(split.feature.index(), 0);
        assert!((split.threshold - 3.5).abs() < 1e-12);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
        // Parent SSE = 6 * 11.5^2; children are pure.
        assert!((split.impurity_decrease - 6.0 * 11.5 * 11.5).abs() < 1e-9);
    }

    #[test]
    fn extra_trees_split_keeps_both_sides() {
        let (features, labels, indices) = step_data();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let split = find_split(
            &features,
            &labels,
            &indices,
            SplitMethod::ExtraTrees,
            None,
            1,
            1,
            &mut rng,
        )
        .expect("split exists");
        assert!(!split.left_indices.is_empty());
        assert!(!split.right_indices.is_empty());
        assert!(split.threshold >= 1.0 && split.threshold < 6.0);
    }

    #[test]
    fn constant_feature_returns_none() {
        let features = vec![vec![3.0; 5]];
        let labels = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let indices: Vec<usize> = (0..5).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for method in [SplitMethod::Exact, SplitMethod::ExtraTrees] {
            let result = find_split(&features, &labels, &indices, method, None, 1, 1, &mut rng);
            assert!(result.is_none(), "{method:?} split a constant feature");
        }
    }

    #[test]
    fn min_samples_leaf_enforced() {
        // The only useful boundary isolates one sample; min_samples_leaf = 2 forbids it.
        let features = vec![vec![1.0, 2.0, 3.0]];
        let labels = vec![100.0, 0.0, 0.0];
        let indices: Vec<usize> = (0..3).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let result = find_split(
            &features,
            &labels,
            &indices,
            SplitMethod::Exact,
            None,
            1,
            2,
            &mut rng,
        );
        assert!(result.is_none());
    }
}
