use std::path::PathBuf;

/// Errors from fitting, scoring, and persisting a regression forest.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// A forest needs at least one tree.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount { n_trees: usize },

    /// `max_depth` was `Some(0)`.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth { max_depth: usize },

    /// A node with fewer than two samples cannot be split.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit { min_samples_split: usize },

    /// Every leaf must hold at least one sample.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf { min_samples_leaf: usize },

    /// The candidate feature count resolved outside `[1, n_features]`.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        max_features: usize,
        n_features: usize,
    },

    /// Bootstrap fraction outside `(0, 1]`, or NaN.
    #[error("bootstrap_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBootstrapFraction { fraction: f64 },

    /// Histogram splitting with fewer than two bins.
    #[error("histogram splitting needs at least 2 bins, got {n_bins}")]
    InvalidBinCount { n_bins: usize },

    #[error("training dataset has zero samples")]
    EmptyDataset,

    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// A training row is shorter or longer than the first row.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        expected: usize,
        got: usize,
        /// Zero-based row of the ragged sample.
        sample_index: usize,
    },

    #[error("got {n_labels} labels for {n_samples} samples")]
    LabelCountMismatch { n_samples: usize, n_labels: usize },

    /// A row passed to `predict` does not match the fitted width.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch { expected: usize, got: usize },

    /// A feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        sample_index: usize,
        feature_index: usize,
    },

    /// A label is NaN or infinite.
    #[error("non-finite label at sample {sample_index}")]
    NonFiniteLabel { sample_index: usize },

    /// Out-of-bag scoring was requested but could not be computed.
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed { reason: String },

    /// A metric was requested over zero (label, prediction) pairs.
    #[error("cannot evaluate a metric over zero predictions")]
    EmptyEvaluation,

    #[error("got {n_predictions} predictions for {n_labels} labels")]
    EvaluationLengthMismatch {
        n_labels: usize,
        n_predictions: usize,
    },

    /// Metric name not one of `rmse`, `mse`, `mae`, `r2`, `var`.
    #[error("unknown regression metric \"{name}\" (expected rmse, mse, mae, r2, or var)")]
    UnknownMetric { name: String },

    #[error("failed to serialize model")]
    SerializeModel { source: Box<bincode::ErrorKind> },

    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        path: PathBuf,
        source: Box<bincode::ErrorKind>,
    },

    #[error("failed to write model to {path}")]
    WriteModel {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read model from {path}")]
    ReadModel {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The model file was written by a different envelope version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        expected: u32,
        found: u32,
        path: PathBuf,
    },
}
