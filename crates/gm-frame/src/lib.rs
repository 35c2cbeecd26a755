#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use gm_columnar::{Column, ColumnError};
use gm_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column '{column}' has {column_len} rows but the table has {table_len}")]
    LengthMismatch {
        column: String,
        table_len: usize,
        column_len: usize,
    },
    #[error("column '{0}' does not exist")]
    UnknownColumn(String),
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("row mask has {mask_len} entries but the table has {table_len} rows")]
    MaskLengthMismatch { mask_len: usize, table_len: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// A named column, typically the result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    column: Column,
}

impl Series {
    #[must_use]
    pub fn new(name: impl Into<String>, column: Column) -> Self {
        Self {
            name: name.into(),
            column,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.column.dtype()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        self.column.values()
    }
}

/// Ordered collection of records sharing one schema. Columns are keyed by
/// name; row order is the load order and is preserved by every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    len: usize,
    columns: BTreeMap<String, Column>,
}

impl Table {
    pub fn new(columns: BTreeMap<String, Column>) -> Result<Self, FrameError> {
        let len = columns.values().next().map_or(0, Column::len);
        for (name, column) in &columns {
            if column.len() != len {
                return Err(FrameError::LengthMismatch {
                    column: name.clone(),
                    table_len: len,
                    column_len: column.len(),
                });
            }
        }

        Ok(Self { len, columns })
    }

    pub fn from_series(series_list: Vec<Series>) -> Result<Self, FrameError> {
        let mut columns = BTreeMap::new();
        for series in series_list {
            if columns.contains_key(&series.name) {
                return Err(FrameError::DuplicateColumn(series.name));
            }
            columns.insert(series.name, series.column);
        }
        Self::new(columns)
    }

    /// Build a table from `(name, values)` pairs, inferring each dtype.
    /// `order` lists the expected column names and rejects unknown pairs.
    pub fn from_dict(order: &[&str], data: Vec<(&str, Vec<Scalar>)>) -> Result<Self, FrameError> {
        let mut columns = BTreeMap::new();
        for (name, values) in data {
            if !order.contains(&name) {
                return Err(FrameError::UnknownColumn(name.to_owned()));
            }
            if columns.contains_key(name) {
                return Err(FrameError::DuplicateColumn(name.to_owned()));
            }
            columns.insert(name.to_owned(), Column::from_values(values)?);
        }
        Self::new(columns)
    }

    /// A zero-row table carrying exactly the given columns and dtypes.
    #[must_use]
    pub fn empty_with_schema<'a>(schema: impl IntoIterator<Item = (&'a str, DType)>) -> Self {
        let columns = schema
            .into_iter()
            .map(|(name, dtype)| (name.to_owned(), Column::empty(dtype)))
            .collect();
        Self { len: 0, columns }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column, FrameError> {
        self.column(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_owned()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(name, dtype)` pairs in column-name order.
    #[must_use]
    pub fn schema(&self) -> Vec<(String, DType)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.dtype()))
            .collect()
    }

    /// Add or replace a column. Its length must match the table's.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self, FrameError> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.len {
            return Err(FrameError::LengthMismatch {
                column: name,
                table_len: self.len,
                column_len: column.len(),
            });
        }
        self.len = column.len();
        self.columns.insert(name, column);
        Ok(self)
    }

    /// Gather rows by position, keeping the order of `positions`.
    pub fn take(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| Ok((name.clone(), column.take(positions)?)))
            .collect::<Result<BTreeMap<_, _>, FrameError>>()?;
        Ok(Self {
            len: positions.len(),
            columns,
        })
    }

    /// Keep the rows where `mask` is `true`; missing mask entries drop the row.
    pub fn filter_rows(&self, mask: &Column) -> Result<Self, FrameError> {
        if mask.len() != self.len {
            return Err(FrameError::MaskLengthMismatch {
                mask_len: mask.len(),
                table_len: self.len,
            });
        }
        let positions = mask.mask_positions()?;
        self.take(&positions)
    }

    /// Rows whose `column` equals `value`. Missing cells never match.
    pub fn select_eq(&self, column: &str, value: &Scalar) -> Result<Self, FrameError> {
        let source = self.require_column(column)?;
        let positions = source
            .values()
            .iter()
            .enumerate()
            .filter_map(|(idx, cell)| (!cell.is_missing() && cell.semantic_eq(value)).then_some(idx))
            .collect::<Vec<_>>();
        self.take(&positions)
    }

    /// Cells of one row keyed by column name.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<BTreeMap<&str, &Scalar>> {
        if idx >= self.len {
            return None;
        }
        Some(
            self.columns
                .iter()
                .filter_map(|(name, column)| column.value(idx).map(|cell| (name.as_str(), cell)))
                .collect(),
        )
    }

    #[must_use]
    pub fn column_mean(&self, name: &str) -> Option<f64> {
        self.column(name).and_then(Column::mean)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((ln, lc), (rn, rc))| ln == rn && lc.semantic_eq(rc))
    }
}

#[cfg(test)]
mod tests {
    use gm_columnar::Column;
    use gm_types::{DType, NullKind, Scalar};

    use super::{FrameError, Series, Table};

    fn stations() -> Table {
        Table::from_dict(
            &["station", "rotd50"],
            vec![
                ("station", vec!["A".into(), "B".into(), "C".into()]),
                (
                    "rotd50",
                    vec![
                        Scalar::Float64(1.0),
                        Scalar::Float64(2.0),
                        Scalar::Float64(3.0),
                    ],
                ),
            ],
        )
        .expect("frame")
    }

    #[test]
    fn from_dict_rejects_ragged_columns() {
        let err = Table::from_dict(
            &["a", "b"],
            vec![
                ("a", vec![Scalar::Int64(1), Scalar::Int64(2)]),
                ("b", vec![Scalar::Int64(1)]),
            ],
        )
        .expect_err("ragged");
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn from_series_rejects_duplicate_names() {
        let a = Series::new(
            "a",
            Column::from_values(vec![Scalar::Int64(1)]).expect("column"),
        );
        let err = Table::from_series(vec![a.clone(), a]).expect_err("duplicate");
        assert!(matches!(err, FrameError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn filter_rows_keeps_true_positions_in_order() {
        let table = stations();
        let mask = Column::from_values(vec![
            Scalar::Bool(false),
            Scalar::Bool(true),
            Scalar::Null(NullKind::Null),
        ])
        .expect("mask");

        let out = table.filter_rows(&mask).expect("filter");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out.column("station").expect("station").values(),
            &[Scalar::Utf8("B".into())]
        );
    }

    #[test]
    fn filter_rows_rejects_wrong_mask_length() {
        let mask = Column::from_values(vec![Scalar::Bool(true)]).expect("mask");
        let err = stations().filter_rows(&mask).expect_err("length");
        assert!(matches!(
            err,
            FrameError::MaskLengthMismatch {
                mask_len: 1,
                table_len: 3
            }
        ));
    }

    #[test]
    fn empty_with_schema_keeps_dtypes() {
        let probe = Table::empty_with_schema([("rotd50", DType::Float64), ("imt", DType::Utf8)]);
        assert!(probe.is_empty());
        assert_eq!(
            probe.schema(),
            vec![
                ("imt".to_owned(), DType::Utf8),
                ("rotd50".to_owned(), DType::Float64)
            ]
        );
    }

    #[test]
    fn select_eq_matches_strings() {
        let out = stations()
            .select_eq("station", &Scalar::Utf8("C".into()))
            .expect("select");
        assert_eq!(out.len(), 1);
        assert_eq!(out.column_mean("rotd50"), Some(3.0));

        let none = stations()
            .select_eq("station", &Scalar::Utf8("Z".into()))
            .expect("select");
        assert!(none.is_empty());
        assert_eq!(none.schema(), stations().schema());
    }

    #[test]
    fn row_exposes_cells_by_name() {
        let table = stations();
        let row = table.row(1).expect("row 1");
        assert_eq!(row["station"], &Scalar::Utf8("B".into()));
        assert!(table.row(3).is_none());
    }

    #[test]
    fn with_column_checks_length() {
        let column = Column::from_values(vec![Scalar::Int64(1)]).expect("col");
        assert!(stations().with_column("size", column).is_err());
    }
}
