//! Tabular I/O for the standings pipeline.
//!
//! Reads CSV from disk or HTTP(S) into an untyped [`Frame`], casts and
//! selects columns, splits rows reproducibly, summarizes numeric columns,
//! assembles feature vectors, and writes CSV artifacts.

mod assemble;
mod error;
mod frame;
mod reader;
mod summary;
mod writer;

pub use assemble::VectorAssembler;
pub use error::IoError;
pub use frame::{Column, DataType, Frame};
pub use reader::CsvSource;
pub use summary::ColumnSummary;
pub use writer::{ArtifactWriter, IMPORTANCE_FILE, PREDICTIONS_FILE, PredictionRow};
