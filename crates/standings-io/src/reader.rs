//! CSV reader producing an untyped [`Frame`] from a local file or an HTTP(S) URL.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::frame::{Column, Frame};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Where a CSV table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvSource {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
}

impl CsvSource {
    /// Classify `location` as a URL when it has an HTTP(S) scheme, else as a path.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            CsvSource::Url(location.to_string())
        } else {
            CsvSource::Path(PathBuf::from(location))
        }
    }

    fn label(&self) -> PathBuf {
        match self {
            CsvSource::Path(path) => path.clone(),
            CsvSource::Url(url) => PathBuf::from(url),
        }
    }

    /// Read the whole table with every column as [`Column::Text`].
    ///
    /// The first record is the header. Cells are kept verbatim; typing is
    /// left to [`Frame::cast`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | local file doesn't exist or is unreadable |
    /// | [`IoError::Download`] | HTTP request failed or returned an error status |
    /// | [`IoError::DownloadBody`] | body could not be read or exceeds the size limit |
    /// | [`IoError::CsvParse`] | malformed CSV record |
    /// | [`IoError::InconsistentRowLength`] | row has a different column count than the header |
    /// | [`IoError::DuplicateColumn`] | header repeats a column name |
    /// | [`IoError::EmptyDataset`] | zero data rows after the header |
    #[instrument(skip(self), fields(source = %self))]
    pub fn read(&self) -> Result<Frame, IoError> {
        match self {
            CsvSource::Path(path) => {
                let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
                    path: path.clone(),
                    source: e,
                })?;
                frame_from_reader(file, &self.label())
            }
            CsvSource::Url(url) => {
                let bytes = download(url)?;
                frame_from_reader(bytes.as_slice(), &self.label())
            }
        }
    }
}

impl fmt::Display for CsvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvSource::Path(path) => write!(f, "{}", path.display()),
            CsvSource::Url(url) => f.write_str(url),
        }
    }
}

fn download(url: &str) -> Result<Vec<u8>, IoError> {
    let response = agent().get(url).call().map_err(|e| IoError::Download {
        url: url.to_string(),
        source: Box::new(e),
    })?;
    let body_error = |source| IoError::DownloadBody {
        url: url.to_string(),
        source,
    };

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_DOWNLOAD_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(body_error)?;
    if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
        return Err(body_error(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("response exceeded {MAX_DOWNLOAD_BYTES} bytes"),
        )));
    }
    debug!(bytes = bytes.len(), "download complete");
    Ok(bytes)
}

/// Parse CSV from any reader into a text frame; `label` names the input in errors.
pub(crate) fn frame_from_reader(reader: impl Read, label: &Path) -> Result<Frame, IoError> {
    let csv_error = |e: csv::Error| IoError::CsvParse {
        path: label.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    };

    // flexible(true) lets InconsistentRowLength fire instead of a generic CsvParse.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let expected = header.len();
    debug!(expected_cols = expected, "read CSV header");

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); expected];
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.map_err(csv_error)?;
        if record.len() != expected {
            return Err(IoError::InconsistentRowLength {
                path: label.to_path_buf(),
                row_index,
                expected,
                got: record.len(),
            });
        }
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(value.to_string());
        }
    }

    let n_rows = cells.first().map_or(0, Vec::len);
    if n_rows == 0 {
        return Err(IoError::EmptyDataset {
            path: label.to_path_buf(),
        });
    }

    let frame = Frame::new(
        header
            .into_iter()
            .zip(cells)
            .map(|(name, values)| (name, Column::Text(values)))
            .collect(),
    )?;

    info!(n_rows, n_columns = frame.n_columns(), "dataset loaded");
    Ok(frame)
}
