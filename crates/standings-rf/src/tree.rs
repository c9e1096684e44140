use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    RfError,
    histogram::FeatureBins,
    node::{Impurity, Node, NodeIndex},
    split::{LabelStats, SplitMethod, find_split},
};

/// Configuration for a single CART regression tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `split_method`      | `Exact`               |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) split_method: SplitMethod,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Defaults as in the table above.
    #[must_use]
    pub fn new() -> Self {
        Self {
            split_method: SplitMethod::Exact,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// How split thresholds are searched.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Depth cap, counting the root as depth 0. `None` grows until the
    /// other stopping rules apply.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Smallest node that may still be split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Smallest child a split may leave behind.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Candidate features drawn per node; `None` tries them all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Seed for feature sampling and extra-trees thresholds.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train a regression tree on a row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]`, `labels[sample_idx]`.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                            |
    /// |--------------------------------------|-------------------------------------------------|
    /// | [`RfError::EmptyDataset`]            | `features` is empty                             |
    /// | [`RfError::ZeroFeatures`]            | rows have zero feature columns                  |
    /// | [`RfError::FeatureCountMismatch`]    | rows have inconsistent lengths                  |
    /// | [`RfError::LabelCountMismatch`]      | `labels.len() != features.len()`                |
    /// | [`RfError::NonFiniteValue`]          | any feature value is NaN or infinite            |
    /// | [`RfError::NonFiniteLabel`]          | any label is NaN or infinite                    |
    /// | [`RfError::InvalidMaxFeatures`]      | `max_features` resolves outside [1, n_features] |
    /// | [`RfError::InvalidMaxDepth`]         | `max_depth` is `Some(0)`                        |
    /// | [`RfError::InvalidMinSamplesSplit`]  | `min_samples_split` < 2                         |
    /// | [`RfError::InvalidMinSamplesLeaf`]   | `min_samples_leaf` < 1                          |
    /// | [`RfError::InvalidBinCount`]         | histogram splitting with fewer than 2 bins      |
    #[instrument(skip(self, features, labels), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], labels: &[f64]) -> Result<DecisionTree, RfError> {
        let n_features = crate::forest::validate_dataset(features, labels)?;
        self.validate(n_features)?;
        let max_features = self.max_features.unwrap_or(n_features);

        let col_features = to_column_major(features, n_features);
        let bins = match self.split_method {
            SplitMethod::Histogram { n_bins } => Some(FeatureBins::build(&col_features, n_bins)),
            _ => None,
        };
        Ok(self.fit_columns(&col_features, labels, max_features, bins.as_ref()))
    }

    pub(crate) fn validate(&self, n_features: usize) -> Result<(), RfError> {
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(RfError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(RfError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        if let SplitMethod::Histogram { n_bins } = self.split_method
            && n_bins < 2
        {
            return Err(RfError::InvalidBinCount { n_bins });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }
        Ok(())
    }

    /// Grow a tree on already-validated column-major data.
    pub(crate) fn fit_columns(
        &self,
        col_features: &[Vec<f64>],
        labels: &[f64],
        max_features: usize,
        bins: Option<&FeatureBins>,
    ) -> DecisionTree {
        let n_features = col_features.len();
        let n_samples = labels.len();
        debug!(n_samples, n_features, max_features, "fitting regression tree");

        let sample_indices: Vec<usize> = (0..n_samples).collect();
        let mut builder = TreeBuilder {
            col_features,
            labels,
            config: self,
            max_features,
            bins,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            arena: Vec::new(),
        };
        builder.build(&sample_indices, 0);

        debug!(n_nodes = builder.arena.len(), "regression tree built");

        DecisionTree {
            nodes: builder.arena,
            n_features,
        }
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn to_column_major(features: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    (0..n_features)
        .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
        .collect()
}

/// Recursive arena builder for one tree.
struct TreeBuilder<'a> {
    col_features: &'a [Vec<f64>],
    labels: &'a [f64],
    config: &'a DecisionTreeConfig,
    max_features: usize,
    bins: Option<&'a FeatureBins>,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Build the subtree for `sample_indices` and return its arena index.
    fn build(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();
        let stats = LabelStats::from_indices(self.labels, sample_indices);
        let impurity = stats.variance();

        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split;

        if too_few || depth_exceeded || stats.is_constant() {
            return self.push_leaf(&stats, impurity);
        }

        let Some(split) = find_split(
            self.col_features,
            self.labels,
            sample_indices,
            self.config.split_method,
            self.bins,
            self.max_features,
            self.config.min_samples_leaf,
            &mut self.rng,
        ) else {
            return self.push_leaf(&stats, impurity);
        };

        // Reserve this node's slot so children get later indices.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value: stats.mean(),
            impurity,
            n_samples,
        });

        let left = self.build(&split.left_indices, depth + 1);
        let right = self.build(&split.right_indices, depth + 1);

        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };

        NodeIndex::new(node_idx)
    }

    fn push_leaf(&mut self, stats: &LabelStats, impurity: Impurity) -> NodeIndex {
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value: stats.mean(),
            impurity,
            n_samples: stats.count,
        });
        NodeIndex::new(idx)
    }
}

/// A fitted CART regression tree.
///
/// Stored as an arena-based `Vec<Node>` with the root at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Mean label of the leaf `sample` lands in. Values equal to a
    /// threshold go left.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(self.leaf_value(sample))
    }

    /// Mean Decrease in Impurity per feature, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Splits plus leaves.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Terminal nodes only.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a single root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node_idx, d)) = stack.pop() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Walk from the root to a leaf and return its value.
    pub(crate) fn leaf_value(&self, sample: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}
