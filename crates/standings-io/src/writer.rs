//! CSV artifact writer for model outputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;

/// File name of the feature importance table.
pub const IMPORTANCE_FILE: &str = "importance.csv";
/// File name of the prediction table.
pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// One row of `predictions.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct PredictionRow {
    /// Finishing position (the model input).
    pub position: i64,
    /// Observed points; empty when the input had none.
    pub points: Option<f64>,
    /// Predicted points.
    pub prediction: f64,
}

#[derive(Serialize)]
struct ImportanceRow {
    importance: f64,
}

/// Writes model artifacts as CSV files into an output directory.
///
/// Creates the output directory on construction if it does not exist.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    /// Create a new writer targeting the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display()))]
    pub fn new(output_dir: &Path) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Directory the artifacts are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `importance.csv`: a single `importance` column, one row per
    /// feature in feature order. Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] or [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(n_features = importances.len()))]
    pub fn write_importances(&self, importances: &[f64]) -> Result<PathBuf, IoError> {
        let rows = importances.iter().map(|&importance| ImportanceRow { importance });
        let path = self.write_rows(IMPORTANCE_FILE, rows)?;
        info!(path = %path.display(), "feature importances written");
        Ok(path)
    }

    /// Write `predictions.csv` with columns `position`, `points`, `prediction`.
    /// Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] or [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(n_rows = rows.len()))]
    pub fn write_predictions(&self, rows: &[PredictionRow]) -> Result<PathBuf, IoError> {
        let path = self.write_rows(PREDICTIONS_FILE, rows.iter())?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    fn write_rows<T: Serialize>(
        &self,
        file_name: &str,
        rows: impl Iterator<Item = T>,
    ) -> Result<PathBuf, IoError> {
        let path = self.output_dir.join(file_name);
        let csv_error = |e: csv::Error| IoError::CsvWrite {
            path: path.clone(),
            source: e,
        };

        let mut wtr = csv::Writer::from_path(&path).map_err(csv_error)?;
        for row in rows {
            wtr.serialize(row).map_err(csv_error)?;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}
