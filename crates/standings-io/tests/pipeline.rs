//! End-to-end integration tests: CSV -> typed frame -> split -> forest -> CSV artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use standings_io::{
    ArtifactWriter, Column, CsvSource, DataType, Frame, PredictionRow, VectorAssembler,
};
use standings_rf::{RandomForestConfig, RegressionMetrics};
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_typed() -> Frame {
    CsvSource::Path(fixture_path("driver_standings_small.csv"))
        .read()
        .expect("fixture should parse")
        .cast("points", DataType::Float64)
        .unwrap()
        .cast("position", DataType::Int64)
        .unwrap()
        .select(&["position", "points"])
        .unwrap()
}

#[test]
fn fixture_loads_and_casts() {
    let raw = CsvSource::Path(fixture_path("driver_standings_small.csv"))
        .read()
        .unwrap();
    assert_eq!(raw.n_rows(), 120);
    assert!(matches!(raw.column("points").unwrap(), Column::Text(_)));

    let typed = load_typed();
    assert_eq!(typed.column_names(), ["position", "points"]);

    // Cast values equal the raw text numerically.
    let Column::Text(raw_positions) = raw.column("position").unwrap() else {
        panic!("raw column should be text");
    };
    for (text, &value) in raw_positions.iter().zip(typed.i64_values("position").unwrap()) {
        assert_eq!(text.parse::<i64>().unwrap(), value);
    }
    let points = typed.f64_values("points").unwrap();
    assert!(points.iter().all(|p| p.is_finite() && *p >= 0.0));
}

#[test]
fn split_is_reproducible_and_covers_all_rows() {
    let frame = load_typed();
    let first = frame.random_split(&[0.8, 0.2], 42).unwrap();
    let second = frame.random_split(&[0.8, 0.2], 42).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].n_rows() + first[1].n_rows(), frame.n_rows());
    assert!(first[0].n_rows() > first[1].n_rows());
}

#[test]
fn train_predict_write_round_trip() {
    let frame = load_typed();
    let splits = frame.random_split(&[0.8, 0.2], 42).unwrap();
    let (train, test) = (&splits[0], &splits[1]);

    let assembler = VectorAssembler::new(&["position"]);
    let train_x = assembler.transform(train).unwrap();
    let train_y = train.f64_values("points").unwrap();
    let test_x = assembler.transform(test).unwrap();
    let test_y = test.f64_values("points").unwrap();

    let result = RandomForestConfig::new(10)
        .unwrap()
        .with_max_depth(Some(5))
        .with_seed(42)
        .fit(&train_x, &train_y, assembler.input_cols())
        .unwrap();
    let predictions = result.forest().predict_batch(&test_x).unwrap();
    let metrics = RegressionMetrics::compute(&test_y, &predictions).unwrap();
    assert!(metrics.rmse >= 0.0);
    assert!((metrics.rmse - metrics.mse.sqrt()).abs() < 1e-9);

    let dir = TempDir::new().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();

    let importance_path = writer.write_importances(result.feature_importances()).unwrap();
    let importance = fs::read_to_string(&importance_path).unwrap();
    let lines: Vec<&str> = importance.lines().collect();
    assert_eq!(lines[0], "importance");
    assert_eq!(lines.len(), 1 + 1, "one row per feature");

    let rows: Vec<PredictionRow> = test
        .i64_values("position")
        .unwrap()
        .iter()
        .zip(&test_y)
        .zip(&predictions)
        .map(|((&position, &points), &prediction)| PredictionRow {
            position,
            points: Some(points),
            prediction,
        })
        .collect();
    let predictions_path = writer.write_predictions(&rows).unwrap();

    let mut rdr = csv::Reader::from_path(&predictions_path).unwrap();
    assert_eq!(
        rdr.headers().unwrap().iter().collect::<Vec<_>>(),
        ["position", "points", "prediction"]
    );
    let read_back: Vec<PredictionRow> = rdr.deserialize().map(Result::unwrap).collect();
    assert_eq!(read_back.len(), test.n_rows());
    assert_eq!(read_back, rows);
}

#[test]
fn summary_describes_training_columns() {
    let frame = load_typed();
    let summary = frame.summary().unwrap();
    let names: Vec<&str> = summary.iter().map(|s| s.column.as_str()).collect();
    assert_eq!(names, ["position", "points"]);
    let position = &summary[0];
    assert_eq!(position.count, 120);
    assert_eq!(position.min, 1.0);
    assert_eq!(position.max, 12.0);
    assert!((position.mean - 6.5).abs() < 1e-12);
}
