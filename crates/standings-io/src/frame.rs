//! Column-oriented in-memory table with casting, selection, and splitting.

use std::collections::HashSet;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::IoError;

/// Element type of a [`Column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Raw text as read from CSV.
    Text,
    /// 64-bit float.
    Float64,
    /// 64-bit signed integer.
    Int64,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Text => "text",
            DataType::Float64 => "float64",
            DataType::Int64 => "int64",
        })
    }
}

/// A homogeneously typed column of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Untyped text cells.
    Text(Vec<String>),
    /// Float cells.
    Float64(Vec<f64>),
    /// Integer cells.
    Int64(Vec<i64>),
}

impl Column {
    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Int64(v) => v.len(),
        }
    }

    /// Return `true` if the column has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this column.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Column::Text(_) => DataType::Text,
            Column::Float64(_) => DataType::Float64,
            Column::Int64(_) => DataType::Int64,
        }
    }

    /// Numeric cells widened to `f64`, or `None` for text.
    #[must_use]
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Text(_) => None,
            Column::Float64(v) => Some(v.clone()),
            Column::Int64(v) => Some(v.iter().map(|&x| x as f64).collect()),
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Text(v) => Column::Text(indices.iter().map(|&i| v[i].clone()).collect()),
            Column::Float64(v) => Column::Float64(indices.iter().map(|&i| v[i]).collect()),
            Column::Int64(v) => Column::Int64(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Convert every cell to `target`, naming `column` in errors.
    fn cast(self, column: &str, target: DataType) -> Result<Column, IoError> {
        let fail = |row_index: usize, raw: String| IoError::CastFailed {
            column: column.to_string(),
            row_index,
            raw,
            target,
        };

        Ok(match (self, target) {
            (col, t) if col.data_type() == t => col,

            (Column::Text(v), DataType::Float64) => Column::Float64(
                v.into_iter()
                    .enumerate()
                    .map(|(i, raw)| match raw.trim().parse::<f64>() {
                        Ok(x) if x.is_finite() => Ok(x),
                        _ => Err(fail(i, raw)),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (Column::Text(v), DataType::Int64) => Column::Int64(
                v.into_iter()
                    .enumerate()
                    .map(|(i, raw)| raw.trim().parse::<i64>().map_err(|_| fail(i, raw)))
                    .collect::<Result<_, _>>()?,
            ),
            (Column::Float64(v), DataType::Int64) => Column::Int64(
                v.into_iter()
                    .enumerate()
                    .map(|(i, x)| {
                        // `i64::MAX as f64` is 2^63, which is itself out of range.
                        if x.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&x) {
                            Ok(x as i64)
                        } else {
                            Err(fail(i, x.to_string()))
                        }
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (Column::Int64(v), DataType::Float64) => {
                Column::Float64(v.into_iter().map(|x| x as f64).collect())
            }
            (Column::Float64(v), DataType::Text) => {
                Column::Text(v.into_iter().map(|x| x.to_string()).collect())
            }
            (Column::Int64(v), DataType::Text) => {
                Column::Text(v.into_iter().map(|x| x.to_string()).collect())
            }
            (col, _) => col,
        })
    }
}

/// An ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame from `(name, column)` pairs.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::DuplicateColumn`] | two columns share a name |
    /// | [`IoError::ColumnLengthMismatch`] | columns differ in length |
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, IoError> {
        let mut seen = HashSet::new();
        let expected = columns.first().map_or(0, |(_, c)| c.len());
        for (name, column) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(IoError::DuplicateColumn {
                    column: name.clone(),
                });
            }
            if column.len() != expected {
                return Err(IoError::ColumnLengthMismatch {
                    column: name.clone(),
                    expected,
                    got: column.len(),
                });
            }
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self { names, columns })
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Iterate `(name, column)` pairs in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(&self.columns)
    }

    /// Return `true` if a column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn position(&self, name: &str) -> Result<usize, IoError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| IoError::MissingColumn {
                column: name.to_string(),
                available: self.names.clone(),
            })
    }

    /// Borrow a column by name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingColumn`] if no column has this name.
    pub fn column(&self, name: &str) -> Result<&Column, IoError> {
        Ok(&self.columns[self.position(name)?])
    }

    /// Replace column `name` with its values converted to `target`.
    ///
    /// Text is trimmed before parsing. Floats must be finite; integers must
    /// be written without a fractional part.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | no column has this name |
    /// | [`IoError::CastFailed`] | a cell does not convert; names the first such row |
    #[instrument(skip(self), fields(n_rows = self.n_rows()))]
    pub fn cast(mut self, name: &str, target: DataType) -> Result<Self, IoError> {
        let idx = self.position(name)?;
        let column = std::mem::replace(&mut self.columns[idx], Column::Text(Vec::new()));
        let from = column.data_type();
        self.columns[idx] = column.cast(name, target)?;
        debug!(column = name, %from, to = %target, "column cast");
        Ok(self)
    }

    /// Keep only the named columns, in the order given.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | a name is not present |
    /// | [`IoError::DuplicateColumn`] | a name is requested twice |
    pub fn select(&self, names: &[&str]) -> Result<Self, IoError> {
        let columns = names
            .iter()
            .map(|&name| Ok((name.to_string(), self.column(name)?.clone())))
            .collect::<Result<Vec<_>, IoError>>()?;
        Frame::new(columns)
    }

    /// Numeric column `name` widened to `f64`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | no column has this name |
    /// | [`IoError::ColumnTypeMismatch`] | the column is text |
    pub fn f64_values(&self, name: &str) -> Result<Vec<f64>, IoError> {
        let column = self.column(name)?;
        column.to_f64().ok_or_else(|| IoError::ColumnTypeMismatch {
            column: name.to_string(),
            expected: "numeric",
            found: column.data_type(),
        })
    }

    /// Integer column `name`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingColumn`] | no column has this name |
    /// | [`IoError::ColumnTypeMismatch`] | the column is not `Int64` |
    pub fn i64_values(&self, name: &str) -> Result<&[i64], IoError> {
        match self.column(name)? {
            Column::Int64(v) => Ok(v),
            other => Err(IoError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: "int64",
                found: other.data_type(),
            }),
        }
    }

    /// Partition rows pseudo-randomly into one frame per weight.
    ///
    /// Weights are normalized to sum to 1. Each row, in input order, draws
    /// one uniform `u` in `[0, 1)` and joins the first subset whose
    /// cumulative bound exceeds `u`, so row order inside each subset follows
    /// the input and the same seed always yields the same partition.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidSplitWeights`] when `weights` is empty,
    /// contains a negative or non-finite value, or sums to zero.
    #[instrument(skip(self), fields(n_rows = self.n_rows()))]
    pub fn random_split(&self, weights: &[f64], seed: u64) -> Result<Vec<Frame>, IoError> {
        let invalid = |reason| IoError::InvalidSplitWeights {
            weights: weights.to_vec(),
            reason,
        };
        if weights.is_empty() {
            return Err(invalid("no weights given"));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("weights must be finite and non-negative"));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(invalid("weights sum to zero"));
        }

        let mut bounds: Vec<f64> = weights
            .iter()
            .scan(0.0, |acc, w| {
                *acc += w / total;
                Some(*acc)
            })
            .collect();
        if let Some(last) = bounds.last_mut() {
            *last = 1.0;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); weights.len()];
        for row in 0..self.n_rows() {
            let u: f64 = rng.r#gen();
            let bucket = bounds.partition_point(|&b| b <= u).min(weights.len() - 1);
            buckets[bucket].push(row);
        }

        debug!(
            sizes = ?buckets.iter().map(Vec::len).collect::<Vec<_>>(),
            seed,
            "random split"
        );
        Ok(buckets.iter().map(|rows| self.take_rows(rows)).collect())
    }

    fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, DataType, Frame};
    use crate::IoError;

    fn text(values: &[&str]) -> Column {
        Column::Text(values.iter().map(|s| s.to_string()).collect())
    }

    fn standings() -> Frame {
        Frame::new(vec![
            ("driverId".into(), text(&["1", "2", "3", "4"])),
            ("points".into(), text(&["25", " 18.5", "15", "0"])),
            ("position".into(), text(&["1", "2", "3 ", "4"])),
        ])
        .unwrap()
    }

    #[test]
    fn cast_text_to_numbers() {
        let frame = standings()
            .cast("points", DataType::Float64)
            .unwrap()
            .cast("position", DataType::Int64)
            .unwrap();
        assert_eq!(
            frame.column("points").unwrap(),
            &Column::Float64(vec![25.0, 18.5, 15.0, 0.0])
        );
        assert_eq!(frame.i64_values("position").unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn cast_rejects_fractional_integer() {
        let frame = Frame::new(vec![("position".into(), text(&["1", "3.5"]))]).unwrap();
        let err = frame.cast("position", DataType::Int64).unwrap_err();
        assert!(matches!(
            err,
            IoError::CastFailed { row_index: 1, ref raw, target: DataType::Int64, .. } if raw == "3.5"
        ));
    }

    #[test]
    fn cast_rejects_non_finite_and_placeholder() {
        for bad in ["NaN", "inf", "\\N", ""] {
            let frame = Frame::new(vec![("points".into(), text(&["1", bad]))]).unwrap();
            let err = frame.cast("points", DataType::Float64).unwrap_err();
            assert!(matches!(err, IoError::CastFailed { row_index: 1, .. }), "{bad:?}");
        }
    }

    #[test]
    fn cast_float_to_int_requires_integral() {
        let frame = Frame::new(vec![("x".into(), Column::Float64(vec![2.0, 2.5]))]).unwrap();
        assert!(frame.clone().cast("x", DataType::Text).is_ok());
        assert!(matches!(
            frame.cast("x", DataType::Int64).unwrap_err(),
            IoError::CastFailed { row_index: 1, .. }
        ));
    }

    #[test]
    fn cast_missing_column() {
        let err = standings().cast("wins", DataType::Int64).unwrap_err();
        assert!(matches!(err, IoError::MissingColumn { ref column, .. } if column == "wins"));
    }

    #[test]
    fn select_reorders_and_drops() {
        let frame = standings().select(&["position", "points"]).unwrap();
        assert_eq!(frame.column_names(), ["position", "points"]);
        assert_eq!(frame.n_rows(), 4);
        assert!(!frame.has_column("driverId"));
        assert!(matches!(
            standings().select(&["points", "points"]).unwrap_err(),
            IoError::DuplicateColumn { .. }
        ));
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = Frame::new(vec![
            ("a".into(), Column::Int64(vec![1, 2])),
            ("b".into(), Column::Int64(vec![1])),
        ])
        .unwrap_err();
        assert!(matches!(err, IoError::ColumnLengthMismatch { expected: 2, got: 1, .. }));
    }

    fn numbered(n: i64) -> Frame {
        Frame::new(vec![("id".into(), Column::Int64((0..n).collect()))]).unwrap()
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let frame = numbered(1000);
        let a = frame.random_split(&[0.8, 0.2], 42).unwrap();
        let b = frame.random_split(&[0.8, 0.2], 42).unwrap();
        assert_eq!(a, b);

        let train = a[0].i64_values("id").unwrap();
        let test = a[1].i64_values("id").unwrap();
        assert_eq!(train.len() + test.len(), 1000);
        assert!(train.windows(2).all(|w| w[0] < w[1]));
        assert!(test.windows(2).all(|w| w[0] < w[1]));
        assert!(train.iter().all(|id| test.binary_search(id).is_err()));
        // Roughly 80/20.
        assert!((700..900).contains(&train.len()), "train size {}", train.len());
    }

    #[test]
    fn split_normalizes_weights() {
        let frame = numbered(200);
        let scaled = frame.random_split(&[4.0, 1.0], 7).unwrap();
        let unit = frame.random_split(&[0.8, 0.2], 7).unwrap();
        assert_eq!(scaled, unit);
    }

    #[test]
    fn split_other_seed_differs() {
        let frame = numbered(200);
        let a = frame.random_split(&[0.5, 0.5], 1).unwrap();
        let b = frame.random_split(&[0.5, 0.5], 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn split_rejects_bad_weights() {
        let frame = numbered(10);
        for weights in [vec![], vec![0.0, 0.0], vec![-1.0, 2.0], vec![f64::NAN]] {
            assert!(
                matches!(
                    frame.random_split(&weights, 42).unwrap_err(),
                    IoError::InvalidSplitWeights { .. }
                ),
                "{weights:?}"
            );
        }
    }

    #[test]
    fn f64_values_rejects_text() {
        let err = standings().f64_values("points").unwrap_err();
        assert!(matches!(
            err,
            IoError::ColumnTypeMismatch { found: DataType::Text, .. }
        ));
    }
}
