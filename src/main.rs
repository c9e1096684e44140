mod pipeline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use standings_io::CsvSource;
use standings_rf::{RegressionMetric, SplitMethod};

use crate::pipeline::TrainSettings;

#[derive(Parser)]
#[command(name = "standings")]
#[command(about = "Random-forest regression of driver points from finishing position")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for the split and the forests
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Train, evaluate, and record a tracked run
    Run {
        /// Standings CSV: a local path or an http(s) URL
        #[arg(long, default_value = "driver_standings.csv")]
        data: String,

        /// Directory of the tracking store
        #[arg(long, default_value = "mlruns")]
        tracking_dir: PathBuf,

        /// Output directory for the model, importance.csv and predictions.csv
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Experiment to record the run under (created if missing)
        #[arg(long, default_value = "driver-standings")]
        experiment: String,

        /// Display name of the run
        #[arg(long, default_value = "Saira RF numTrees=10,maxDepth=5")]
        run_name: String,

        /// Number of trees in the tracked forest
        #[arg(long, default_value_t = 10)]
        num_trees: usize,

        /// Maximum depth of each tree
        #[arg(long, default_value_t = 5)]
        max_depth: usize,

        /// Trees in the untracked baseline forest (0 skips it)
        #[arg(long, default_value_t = 5)]
        baseline_trees: usize,

        /// Split-finding strategy: "exact", "extra-trees", or "histogram"
        #[arg(long, default_value = "histogram")]
        split_method: String,

        /// Bins per feature for the histogram split method
        #[arg(long, default_value_t = 32)]
        n_bins: usize,

        /// Compute and log the out-of-bag estimate
        #[arg(long, default_value_t = false)]
        oob: bool,

        /// Share of rows in the training set
        #[arg(long, default_value_t = 0.8)]
        train_fraction: f64,
    },

    /// Score a CSV with a saved model
    Predict {
        /// Path to a saved model.bin
        #[arg(long)]
        model: PathBuf,

        /// CSV with a position column (points optional): a local path or an http(s) URL
        #[arg(long)]
        data: String,

        /// Output directory for predictions.csv
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// List the runs of an experiment and report the best one
    Runs {
        /// Directory of the tracking store
        #[arg(long, default_value = "mlruns")]
        tracking_dir: PathBuf,

        /// Experiment name
        #[arg(long, default_value = "driver-standings")]
        experiment: String,

        /// Metric used to rank runs
        #[arg(long, default_value = "rmse")]
        metric: String,

        /// Rank by highest value (implied for r2 and var)
        #[arg(long, default_value_t = false)]
        maximize: bool,
    },
}

fn parse_split_method(s: &str, n_bins: usize) -> Result<SplitMethod> {
    match s {
        "exact" => Ok(SplitMethod::Exact),
        "extra-trees" => Ok(SplitMethod::ExtraTrees),
        "histogram" => Ok(SplitMethod::Histogram { n_bins }),
        other => anyhow::bail!("unknown split method: {other} (expected exact, extra-trees, or histogram)"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Run {
            data,
            tracking_dir,
            output_dir,
            experiment,
            run_name,
            num_trees,
            max_depth,
            baseline_trees,
            split_method,
            n_bins,
            oob,
            train_fraction,
        } => {
            let settings = TrainSettings {
                data: CsvSource::parse(&data),
                tracking_dir,
                output_dir,
                experiment,
                run_name,
                num_trees,
                max_depth,
                baseline_trees,
                split_method: parse_split_method(&split_method, n_bins)?,
                oob,
                train_fraction,
                seed: cli.seed,
            };
            let output = pipeline::train(&settings)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            output_dir,
        } => {
            let output = pipeline::predict(&model, &CsvSource::parse(&data), &output_dir)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Runs {
            tracking_dir,
            experiment,
            metric,
            maximize,
        } => {
            let maximize = maximize
                || metric
                    .parse::<RegressionMetric>()
                    .is_ok_and(RegressionMetric::higher_is_better);
            let output = pipeline::compare_runs(&tracking_dir, &experiment, &metric, maximize)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, parse_split_method};
    use standings_rf::SplitMethod;

    #[test]
    fn run_defaults_reproduce_reference_run() {
        let cli = Cli::try_parse_from(["standings", "run"]).unwrap();
        assert_eq!(cli.seed, 42);
        let Command::Run {
            num_trees,
            max_depth,
            run_name,
            train_fraction,
            baseline_trees,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(num_trees, 10);
        assert_eq!(max_depth, 5);
        assert_eq!(baseline_trees, 5);
        assert_eq!(run_name, "Saira RF numTrees=10,maxDepth=5");
        assert!((train_fraction - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn split_methods_parse() {
        assert_eq!(parse_split_method("exact", 32).unwrap(), SplitMethod::Exact);
        assert_eq!(
            parse_split_method("histogram", 64).unwrap(),
            SplitMethod::Histogram { n_bins: 64 }
        );
        assert!(parse_split_method("gbm", 32).is_err());
    }

    #[test]
    fn predict_requires_model() {
        assert!(Cli::try_parse_from(["standings", "predict", "--data", "x.csv"]).is_err());
    }
}
