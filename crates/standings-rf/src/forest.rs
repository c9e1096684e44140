//! Random Forest regression training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{OobMode, RandomForestConfig};
use crate::error::RfError;
use crate::histogram::FeatureBins;
use crate::importance::aggregate_importances;
use crate::oob::compute_oob;
use crate::result::{RandomForestResult, TrainingMetadata};
use crate::split::SplitMethod;
use crate::tree::{DecisionTree, DecisionTreeConfig, to_column_major};

/// A fitted Random Forest regression ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
}

/// Check shape and finiteness of a training set; return the feature count.
pub(crate) fn validate_dataset(features: &[Vec<f64>], labels: &[f64]) -> Result<usize, RfError> {
    if features.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    if labels.len() != features.len() {
        return Err(RfError::LabelCountMismatch {
            n_samples: features.len(),
            n_labels: labels.len(),
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(RfError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    if let Some(sample_index) = labels.iter().position(|y| !y.is_finite()) {
        return Err(RfError::NonFiniteLabel { sample_index });
    }
    Ok(n_features)
}

/// Draw `draw_count` indices with replacement; return them with the out-of-bag rest.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    labels: &[f64],
    feature_names: &[String],
) -> Result<RandomForestResult, RfError> {
    let n_features = validate_dataset(features, labels)?;
    let n_samples = features.len();

    let max_features_resolved = config.max_features.resolve(n_features)?;
    if !(config.bootstrap_fraction > 0.0 && config.bootstrap_fraction <= 1.0) {
        return Err(RfError::InvalidBootstrapFraction {
            fraction: config.bootstrap_fraction,
        });
    }

    let tree_config = DecisionTreeConfig::new()
        .with_split_method(config.split_method)
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_max_features(Some(max_features_resolved));
    tree_config.validate(n_features)?;

    let feature_names = if feature_names.len() == n_features {
        feature_names.to_vec()
    } else {
        (0..n_features).map(|f| format!("f{f}")).collect()
    };

    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        max_features = max_features_resolved,
        max_depth = ?config.max_depth,
        draw_count,
        "training random forest regressor"
    );

    let col_features = to_column_major(features, n_features);
    // Bin edges come from the full training set and are shared by every tree.
    let bins = match config.split_method {
        SplitMethod::Histogram { n_bins } => Some(FeatureBins::build(&col_features, n_bins)),
        _ => None,
    };

    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_results: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) =
                bootstrap_sample(n_samples, draw_count, &mut rng);

            let boot_columns: Vec<Vec<f64>> = col_features
                .iter()
                .map(|col| bootstrap_indices.iter().map(|&i| col[i]).collect())
                .collect();
            let boot_labels: Vec<f64> = bootstrap_indices.iter().map(|&i| labels[i]).collect();

            let tree = tree_config.clone().with_seed(rng.r#gen()).fit_columns(
                &boot_columns,
                &boot_labels,
                max_features_resolved,
                bins.as_ref(),
            );
            (tree, oob_indices)
        })
        .collect();

    let (trees, oob_indices_per_tree): (Vec<DecisionTree>, Vec<Vec<usize>>) =
        tree_results.into_iter().unzip();

    let per_tree_importances: Vec<Vec<f64>> =
        trees.iter().map(DecisionTree::feature_importances).collect();
    let importances = aggregate_importances(&per_tree_importances, n_features);

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let oob_score = match config.oob_mode {
        OobMode::Enabled => Some(compute_oob(&trees, features, labels, &oob_indices_per_tree)?),
        OobMode::Disabled => None,
    };

    let forest = RandomForest {
        trees,
        n_features,
        feature_names,
    };

    let metadata = TrainingMetadata {
        n_trees: config.n_trees,
        n_features,
        n_samples,
        max_features_resolved,
        max_depth: config.max_depth,
    };

    info!(
        oob_mse = oob_score.as_ref().map(|s| s.mse),
        "random forest training complete"
    );

    Ok(RandomForestResult::new(
        forest,
        importances,
        oob_score,
        oob_indices_per_tree,
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
    use crate::split::SplitMethod;

    /// Standings-like data: points fall off steeply with finishing position.
    fn make_standings_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let table = [25.0, 18.0, 15.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0, 1.0];
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for round in 0..6 {
            for position in 1..=20 {
                features.push(vec![f64::from(position)]);
                let base = table.get(position as usize - 1).copied().unwrap_or(0.0);
                labels.push(base + f64::from(round % 3));
            }
        }
        (features, labels, vec!["position".to_string()])
    }

    fn mse(forest: &crate::RandomForest, features: &[Vec<f64>], labels: &[f64]) -> f64 {
        let preds = forest.predict_batch(features).unwrap();
        preds
            .iter()
            .zip(labels)
            .map(|(p, y)| (p - y).powi(2))
            .sum::<f64>()
            / labels.len() as f64
    }

    #[test]
    fn fits_points_curve() {
        let (features, labels, names) = make_standings_data();
        let result = RandomForestConfig::new(20)
            .unwrap()
            .with_max_depth(Some(5))
            .fit(&features, &labels, &names)
            .unwrap();
        let error = mse(result.forest(), &features, &labels);
        assert!(error < 5.0, "training mse = {error}");
    }

    #[test]
    fn oob_score_computed() {
        let (features, labels, names) = make_standings_data();
        let result = RandomForestConfig::new(30)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit(&features, &labels, &names)
            .unwrap();
        let oob = result.oob_score().expect("OOB should be computed");
        assert!(oob.n_oob_samples > 0);
        assert!(oob.r2 > 0.8, "oob r2 = {}", oob.r2);
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let (mut features, labels, _) = make_standings_data();
        for (i, row) in features.iter_mut().enumerate() {
            row.push((i % 7) as f64);
        }
        let names = vec!["position".to_string(), "noise".to_string()];
        let result = RandomForestConfig::new(20)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&features, &labels, &names)
            .unwrap();
        let importances = result.feature_importances();
        let total: f64 = importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels, names) = make_standings_data();
        let fit = || {
            RandomForestConfig::new(10)
                .unwrap()
                .with_seed(99)
                .with_max_depth(Some(5))
                .fit(&features, &labels, &names)
                .unwrap()
        };
        let preds1 = fit().forest().predict_batch(&features).unwrap();
        let preds2 = fit().forest().predict_batch(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn different_seeds_differ() {
        let (features, labels, names) = make_standings_data();
        let fit = |seed| {
            RandomForestConfig::new(5)
                .unwrap()
                .with_seed(seed)
                .with_split_method(SplitMethod::ExtraTrees)
                .fit(&features, &labels, &names)
                .unwrap()
        };
        let preds1 = fit(1).forest().predict_batch(&features).unwrap();
        let preds2 = fit(2).forest().predict_batch(&features).unwrap();
        assert_ne!(preds1, preds2);
    }

    #[test]
    fn empty_dataset_error() {
        let config = RandomForestConfig::new(10).unwrap();
        let err = config.fit(&[], &[], &[]).unwrap_err();
        assert!(matches!(err, crate::RfError::EmptyDataset));
    }

    #[test]
    fn zero_depth_error() {
        let (features, labels, names) = make_standings_data();
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_max_depth(Some(0))
            .fit(&features, &labels, &names)
            .unwrap_err();
        assert!(matches!(err, crate::RfError::InvalidMaxDepth { max_depth: 0 }));
    }

    #[test]
    fn bad_bootstrap_fraction_error() {
        let (features, labels, names) = make_standings_data();
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_bootstrap_fraction(0.0)
            .fit(&features, &labels, &names)
            .unwrap_err();
        assert!(matches!(err, crate::RfError::InvalidBootstrapFraction { .. }));
    }

    #[test]
    fn histogram_and_extra_trees_fit() {
        let (features, labels, names) = make_standings_data();
        for method in [SplitMethod::ExtraTrees, SplitMethod::Histogram { n_bins: 32 }] {
            let result = RandomForestConfig::new(20)
                .unwrap()
                .with_split_method(method)
                .with_max_depth(Some(5))
                .fit(&features, &labels, &names)
                .unwrap();
            let error = mse(result.forest(), &features, &labels);
            assert!(error < 8.0, "{method:?} training mse = {error}");
        }
    }

    #[test]
    fn missing_names_are_generated() {
        let (features, labels, _) = make_standings_data();
        let result = RandomForestConfig::new(2).unwrap().fit(&features, &labels, &[]).unwrap();
        assert_eq!(result.forest().feature_names().to_vec(), vec!["f0".to_string()]);
    }
}
