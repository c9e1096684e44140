//! Random Forest regression: train, evaluate, predict, persist.
//!
//! CART regression trees with variance impurity, bootstrap aggregation
//! with parallel training via rayon, exact/extra-trees/histogram split
//! search, out-of-bag scoring, impurity-based feature importance,
//! regression metrics, and versioned bincode model files.

mod config;
mod error;
mod forest;
mod histogram;
mod importance;
mod metrics;
mod node;
mod oob;
mod predict;
mod result;
mod serialize;
mod split;
mod tree;

pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use error::RfError;
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use metrics::{RegressionEvaluator, RegressionMetric, RegressionMetrics};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use result::{RandomForestResult, TrainingMetadata};
pub use split::SplitMethod;
pub use tree::{DecisionTree, DecisionTreeConfig};
