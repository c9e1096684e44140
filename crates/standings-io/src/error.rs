//! I/O error types for standings-io.

use std::path::PathBuf;

use crate::frame::DataType;

/// Errors from loading, reshaping, and writing tabular data.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an HTTP(S) request for the input fails.
    #[error("download failed: {url}")]
    Download {
        /// URL that was requested.
        url: String,
        /// Underlying HTTP error.
        source: Box<ureq::Error>,
    },

    /// Returned when reading a downloaded body fails or it exceeds the size limit.
    #[error("cannot read response body from {url}")]
    DownloadBody {
        /// URL that was requested.
        url: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path or URL of the CSV input.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV input contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path or URL of the CSV input.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path or URL of the CSV input.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when the same column name appears twice in one frame.
    #[error("duplicate column \"{column}\"")]
    DuplicateColumn {
        /// The repeated name.
        column: String,
    },

    /// Returned when the columns of a frame have different lengths.
    #[error("column \"{column}\" has {got} rows, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the offending column.
        column: String,
        /// Row count of the first column.
        expected: usize,
        /// Row count of this column.
        got: usize,
    },

    /// Returned when a named column is not present.
    #[error("missing column \"{column}\" (available: {available:?})")]
    MissingColumn {
        /// The requested column.
        column: String,
        /// Columns the frame does have.
        available: Vec<String>,
    },

    /// Returned when a value cannot be converted to the requested type.
    #[error("cannot cast column \"{column}\" row {row_index} value \"{raw}\" to {target}")]
    CastFailed {
        /// Column being cast.
        column: String,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The value as it appeared before the cast.
        raw: String,
        /// The requested type.
        target: DataType,
    },

    /// Returned when an operation needs a column of a different type.
    #[error("column \"{column}\" is {found}, expected {expected}")]
    ColumnTypeMismatch {
        /// Name of the column.
        column: String,
        /// What the operation accepts.
        expected: &'static str,
        /// The column's actual type.
        found: DataType,
    },

    /// Returned when split weights are empty, negative, non-finite, or sum to zero.
    #[error("invalid split weights {weights:?}: {reason}")]
    InvalidSplitWeights {
        /// The weights provided.
        weights: Vec<f64>,
        /// What is wrong with them.
        reason: &'static str,
    },

    /// Returned when an operation needs at least one row.
    #[error("cannot {operation} an empty frame")]
    EmptyFrame {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV writer fails to serialize a record.
    #[error("cannot write CSV record to {path}")]
    CsvWrite {
        /// Path of the CSV output.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
}
