//! Packs numeric frame columns into row-major feature vectors.

use tracing::debug;

use crate::IoError;
use crate::frame::Frame;

/// Combines the named input columns into one `Vec<f64>` per row.
#[derive(Debug, Clone)]
pub struct VectorAssembler {
    input_cols: Vec<String>,
}

impl VectorAssembler {
    /// Create an assembler over `input_cols`, in the order they will appear
    /// in each feature vector.
    pub fn new<S: AsRef<str>>(input_cols: &[S]) -> Self {
        Self {
            input_cols: input_cols.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    /// Names of the assembled features.
    #[must_use]
    pub fn input_cols(&self) -> &[String] {
        &self.input_cols
    }

    /// Build `features[row][input_col]` from `frame`.
    ///
    /// Integer columns are widened to `f64`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | an input column is absent |
    /// | [`IoError::ColumnTypeMismatch`] | an input column is text |
    pub fn transform(&self, frame: &Frame) -> Result<Vec<Vec<f64>>, IoError> {
        let columns = self
            .input_cols
            .iter()
            .map(|name| frame.f64_values(name))
            .collect::<Result<Vec<_>, _>>()?;

        let rows: Vec<Vec<f64>> = (0..frame.n_rows())
            .map(|row| columns.iter().map(|col| col[row]).collect())
            .collect();
        debug!(n_rows = rows.len(), n_features = self.input_cols.len(), "features assembled");
        Ok(rows)
    }
}
