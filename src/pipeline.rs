//! The end-to-end standings workflows behind each subcommand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use standings_io::{
    ArtifactWriter, ColumnSummary, CsvSource, DataType, Frame, PredictionRow, VectorAssembler,
};
use standings_rf::{
    OobMode, OobScore, RandomForest, RandomForestConfig, RankedFeature, RegressionEvaluator,
    RegressionMetric, RegressionMetrics, SplitMethod,
};
use standings_track::{ActiveRun, RunStatus, TrackingStore};

/// Model input column.
pub const FEATURE_COL: &str = "position";
/// Model target column.
pub const LABEL_COL: &str = "points";
/// Artifact subdirectory holding the fitted forest.
pub const MODEL_ARTIFACT_DIR: &str = "random-forest-model";
/// File name of the serialized forest.
pub const MODEL_FILE: &str = "model.bin";

/// Metrics logged to the tracked run, in logging order.
const LOGGED_METRICS: [RegressionMetric; 4] = [
    RegressionMetric::R2,
    RegressionMetric::Mae,
    RegressionMetric::Rmse,
    RegressionMetric::Mse,
];

/// Everything one training run needs.
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub data: CsvSource,
    pub tracking_dir: PathBuf,
    pub output_dir: PathBuf,
    pub experiment: String,
    pub run_name: String,
    pub num_trees: usize,
    pub max_depth: usize,
    /// Trees in the untracked baseline forest; 0 skips it.
    pub baseline_trees: usize,
    pub split_method: SplitMethod,
    pub oob: bool,
    pub train_fraction: f64,
    pub seed: u64,
}

// --- JSON stdout output structs ---

#[derive(Debug, Serialize)]
pub struct TrainOutput {
    pub experiment: String,
    pub experiment_id: String,
    pub run_id: String,
    pub run_name: String,
    pub status: RunStatus,
    pub n_rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub train_summary: Vec<ColumnSummary>,
    pub baseline_rmse: Option<f64>,
    pub metrics: RegressionMetrics,
    pub oob: Option<OobScore>,
    pub importances: Vec<RankedFeature>,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictOutput {
    pub model_n_trees: usize,
    pub model_n_features: usize,
    pub n_rows: usize,
    pub predictions: PathBuf,
    pub metrics: Option<RegressionMetrics>,
}

#[derive(Debug, Serialize)]
pub struct RunsOutput {
    pub experiment: String,
    pub experiment_id: String,
    pub metric: String,
    pub maximize: bool,
    pub runs: Vec<RunRow>,
    pub best_run_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunRow {
    pub run_id: String,
    pub run_name: String,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

/// Read the source and keep `position` (as `Int64`) and `points` (as `Float64`).
#[instrument(skip_all, fields(source = %source))]
pub fn load_standings(source: &CsvSource) -> Result<Frame> {
    let raw = source
        .read()
        .with_context(|| format!("failed to read {source}"))?;
    let frame = raw
        .cast(LABEL_COL, DataType::Float64)
        .context("failed to cast points")?
        .cast(FEATURE_COL, DataType::Int64)
        .context("failed to cast position")?
        .select(&[FEATURE_COL, LABEL_COL])?;
    info!(n_rows = frame.n_rows(), "standings loaded");
    Ok(frame)
}

fn forest_config(
    n_trees: usize,
    max_depth: usize,
    settings: &TrainSettings,
) -> Result<RandomForestConfig> {
    let oob_mode = if settings.oob {
        OobMode::Enabled
    } else {
        OobMode::Disabled
    };
    Ok(RandomForestConfig::new(n_trees)?
        .with_max_depth(Some(max_depth))
        .with_split_method(settings.split_method)
        .with_seed(settings.seed)
        .with_oob_mode(oob_mode))
}

/// Load, split, fit, evaluate, and record one tracked run.
///
/// Loading and splitting happen before the run is opened, so a bad input
/// file leaves no run behind. Anything failing after that ends the run as
/// `FAILED`.
#[instrument(skip_all, fields(experiment = %settings.experiment, run_name = %settings.run_name))]
pub fn train(settings: &TrainSettings) -> Result<TrainOutput> {
    let frame = load_standings(&settings.data)?;

    let weights = [settings.train_fraction, 1.0 - settings.train_fraction];
    let mut splits = frame
        .random_split(&weights, settings.seed)
        .context("failed to split dataset")?
        .into_iter();
    let (Some(train_df), Some(test_df)) = (splits.next(), splits.next()) else {
        anyhow::bail!("split produced fewer than two subsets");
    };
    info!(
        n_train = train_df.n_rows(),
        n_test = test_df.n_rows(),
        "dataset split"
    );

    let train_summary = train_df.summary().context("failed to summarize training set")?;
    for s in &train_summary {
        info!(
            column = %s.column,
            count = s.count,
            mean = s.mean,
            stddev = ?s.stddev,
            min = s.min,
            p50 = s.p50,
            max = s.max,
            "training summary"
        );
    }

    let assembler = VectorAssembler::new(&[FEATURE_COL]);
    let train_x = assembler.transform(&train_df)?;
    let train_y = train_df.f64_values(LABEL_COL)?;
    let test_x = assembler.transform(&test_df)?;
    let test_y = test_df.f64_values(LABEL_COL)?;

    let baseline_rmse = if settings.baseline_trees > 0 {
        let baseline = forest_config(settings.baseline_trees, 5, settings)?
            .with_oob_mode(OobMode::Disabled)
            .fit(&train_x, &train_y, assembler.input_cols())
            .context("baseline training failed")?;
        let preds = baseline.forest().predict_batch(&test_x)?;
        let rmse = RegressionEvaluator::new(RegressionMetric::Rmse).evaluate(&test_y, &preds)?;
        info!(n_trees = settings.baseline_trees, rmse, "baseline evaluated");
        Some(rmse)
    } else {
        None
    };

    let store = TrackingStore::open(&settings.tracking_dir)
        .context("failed to open tracking store")?;
    let (tracked, info) = store.with_run(&settings.experiment, &settings.run_name, |run| {
        let config = forest_config(settings.num_trees, settings.max_depth, settings)?;
        run.log_param("num_trees", settings.num_trees)?;
        run.log_param("max_depth", settings.max_depth)?;

        let result = config
            .fit(&train_x, &train_y, assembler.input_cols())
            .context("training failed")?;
        let forest = result.forest();
        let predictions = forest.predict_batch(&test_x)?;
        let metrics = RegressionMetrics::compute(&test_y, &predictions)
            .context("evaluation failed")?;
        for metric in LOGGED_METRICS {
            run.log_metric(metric.name(), metrics.get(metric))?;
        }
        let oob = result.oob_score().cloned();
        if let Some(score) = &oob {
            run.log_metric("oob_mse", score.mse)?;
            run.log_metric("oob_r2", score.r2)?;
        }
        info!(
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            "tracked model evaluated"
        );

        let writer = ArtifactWriter::new(&settings.output_dir)?;
        log_model(run, forest, writer.output_dir())?;

        let importance_path = writer.write_importances(result.feature_importances())?;
        run.log_artifact(&importance_path, None)?;

        let rows: Vec<PredictionRow> = test_df
            .i64_values(FEATURE_COL)?
            .iter()
            .zip(&test_y)
            .zip(&predictions)
            .map(|((&position, &points), &prediction)| PredictionRow {
                position,
                points: Some(points),
                prediction,
            })
            .collect();
        let predictions_path = writer.write_predictions(&rows)?;
        run.log_artifact(&predictions_path, None)?;

        Ok::<_, anyhow::Error>((metrics, oob, result.ranked_importances()))
    })?;
    let (metrics, oob, importances) = tracked;
    info!(run_id = %info.run_id, experiment_id = %info.experiment_id, "run recorded");

    Ok(TrainOutput {
        experiment: settings.experiment.clone(),
        experiment_id: info.experiment_id,
        run_id: info.run_id,
        run_name: info.run_name,
        status: info.status,
        n_rows: frame.n_rows(),
        n_train: train_df.n_rows(),
        n_test: test_df.n_rows(),
        train_summary,
        baseline_rmse,
        metrics,
        oob,
        importances,
        artifacts: info.artifacts,
    })
}

/// Save the forest under `output_dir` and log it as `random-forest-model/model.bin`.
fn log_model(run: &mut ActiveRun, forest: &RandomForest, output_dir: &Path) -> Result<String> {
    let local = output_dir.join(MODEL_ARTIFACT_DIR).join(MODEL_FILE);
    forest
        .save(&local)
        .with_context(|| format!("failed to save model to {}", local.display()))?;
    Ok(run.log_artifact(&local, Some(MODEL_ARTIFACT_DIR))?)
}

/// Score a CSV with a saved model and write `predictions.csv`.
///
/// `points` is optional in the input; when present the predictions are
/// also evaluated against it.
#[instrument(skip_all, fields(model = %model.display(), source = %data))]
pub fn predict(model: &Path, data: &CsvSource, output_dir: &Path) -> Result<PredictOutput> {
    let forest = RandomForest::load(model).context("failed to load model")?;
    info!(
        n_trees = forest.n_trees(),
        n_features = forest.n_features(),
        "model loaded"
    );

    let mut frame = data
        .read()
        .with_context(|| format!("failed to read {data}"))?
        .cast(FEATURE_COL, DataType::Int64)
        .context("failed to cast position")?;
    let labels = if frame.has_column(LABEL_COL) {
        frame = frame
            .cast(LABEL_COL, DataType::Float64)
            .context("failed to cast points")?;
        Some(frame.f64_values(LABEL_COL)?)
    } else {
        None
    };

    let features = VectorAssembler::new(forest.feature_names()).transform(&frame)?;
    let predictions = forest.predict_batch(&features).context("prediction failed")?;

    let rows: Vec<PredictionRow> = frame
        .i64_values(FEATURE_COL)?
        .iter()
        .enumerate()
        .map(|(i, &position)| PredictionRow {
            position,
            points: labels.as_ref().map(|l| l[i]),
            prediction: predictions[i],
        })
        .collect();
    let path = ArtifactWriter::new(output_dir)?.write_predictions(&rows)?;

    let metrics = labels
        .as_deref()
        .map(|l| RegressionMetrics::compute(l, &predictions))
        .transpose()?;

    Ok(PredictOutput {
        model_n_trees: forest.n_trees(),
        model_n_features: forest.n_features(),
        n_rows: rows.len(),
        predictions: path,
        metrics,
    })
}

/// List the runs of an experiment and pick the best by `metric`.
pub fn compare_runs(
    tracking_dir: &Path,
    experiment: &str,
    metric: &str,
    maximize: bool,
) -> Result<RunsOutput> {
    let store = TrackingStore::open(tracking_dir).context("failed to open tracking store")?;
    let found = store.experiment_by_name(experiment)?;
    let runs = store.list_runs(&found)?;
    let best = store.best_run(&found, metric, maximize)?;
    info!(n_runs = runs.len(), "runs listed");

    Ok(RunsOutput {
        experiment: found.name,
        experiment_id: found.experiment_id,
        metric: metric.to_string(),
        maximize,
        runs: runs
            .into_iter()
            .map(|r| RunRow {
                metrics: r.latest_metrics(),
                run_id: r.run_id,
                run_name: r.run_name,
                status: r.status,
                params: r.params,
            })
            .collect(),
        best_run_id: best.map(|r| r.run_id),
    })
}
