#![forbid(unsafe_code)]

//! Declared shape of the dataset.
//!
//! The registry is built once from the store's table and never changes
//! afterwards. Validation evaluates expressions against [`SchemaRegistry::probe`],
//! a zero-row table with the same columns and dtypes, so it never touches the
//! live data.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use gm_frame::Table;
use gm_types::DType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    String,
    Categorical,
}

impl ColumnType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Categorical => "categorical",
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnInfo {
    dtype: DType,
    column_type: ColumnType,
    categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    columns: BTreeMap<String, ColumnInfo>,
    probe: Table,
}

impl SchemaRegistry {
    /// Describe `table`. Text columns named in `categorical_columns` become
    /// [`ColumnType::Categorical`] and record their sorted distinct values;
    /// names that are absent or not text are ignored.
    pub fn from_table<I, S>(table: &Table, categorical_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let categorical = categorical_columns
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect::<BTreeSet<_>>();

        let mut columns = BTreeMap::new();
        for (name, column) in table.columns() {
            let dtype = column.dtype();
            let info = if dtype == DType::Utf8 && categorical.contains(name) {
                let distinct = column
                    .values()
                    .iter()
                    .filter_map(|cell| cell.as_str())
                    .collect::<BTreeSet<_>>();
                ColumnInfo {
                    dtype,
                    column_type: ColumnType::Categorical,
                    categories: Some(distinct.into_iter().map(str::to_owned).collect()),
                }
            } else {
                ColumnInfo {
                    dtype,
                    column_type: column_type_for(dtype),
                    categories: None,
                }
            };
            columns.insert(name.clone(), info);
        }

        let probe = Table::empty_with_schema(
            columns
                .iter()
                .map(|(name, info)| (name.as_str(), info.dtype)),
        );
        Self { columns, probe }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns
            .iter()
            .map(|(name, info)| (name.as_str(), info.column_type))
    }

    #[must_use]
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).map(|info| info.column_type)
    }

    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.columns.get(name).map(|info| info.dtype)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Sorted distinct values of a categorical column.
    #[must_use]
    pub fn categories(&self, name: &str) -> Option<&[String]> {
        self.columns
            .get(name)
            .and_then(|info| info.categories.as_deref())
    }

    /// Zero-row table with exactly the declared columns and dtypes.
    #[must_use]
    pub fn probe(&self) -> &Table {
        &self.probe
    }

    /// Whether `table` has the same column names and dtypes.
    #[must_use]
    pub fn describes(&self, table: &Table) -> bool {
        self.probe.schema() == table.schema()
    }
}

fn column_type_for(dtype: DType) -> ColumnType {
    match dtype {
        DType::Bool => ColumnType::Boolean,
        DType::Int64 => ColumnType::Integer,
        // An all-missing column loads as null; treat it like a float column of NaN.
        DType::Float64 | DType::Null => ColumnType::Float,
        DType::Utf8 => ColumnType::String,
    }
}

#[cfg(test)]
mod tests {
    use gm_frame::Table;
    use gm_types::{DType, NullKind, Scalar};

    use super::{ColumnType, SchemaRegistry};

    fn readings() -> Table {
        Table::from_dict(
            &["station", "imt", "rotd50", "count", "flag"],
            vec![
                ("station", vec!["A".into(), "B".into(), "A".into()]),
                ("imt", vec!["PGV".into(), "PGA".into(), "PGA".into()]),
                (
                    "rotd50",
                    vec![Scalar::Float64(1.0), Scalar::Null(NullKind::NaN), 3.0.into()],
                ),
                ("count", vec![1_i64.into(), 2_i64.into(), 3_i64.into()]),
                ("flag", vec![true.into(), false.into(), true.into()]),
            ],
        )
        .expect("table")
    }

    #[test]
    fn column_types_follow_dtypes() {
        let schema = SchemaRegistry::from_table(&readings(), ["imt"]);
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.column_type("station"), Some(ColumnType::String));
        assert_eq!(schema.column_type("imt"), Some(ColumnType::Categorical));
        assert_eq!(schema.column_type("rotd50"), Some(ColumnType::Float));
        assert_eq!(schema.column_type("count"), Some(ColumnType::Integer));
        assert_eq!(schema.column_type("flag"), Some(ColumnType::Boolean));
        assert_eq!(schema.column_type("lat"), None);
        assert!(schema.contains("station"));
        assert!(!schema.contains("nonexistent_col"));
    }

    #[test]
    fn categories_are_sorted_and_distinct() {
        let schema = SchemaRegistry::from_table(&readings(), ["imt", "rotd50", "missing"]);
        assert_eq!(
            schema.categories("imt"),
            Some(&["PGA".to_owned(), "PGV".to_owned()][..])
        );
        // Non-text and absent names are not categorical.
        assert_eq!(schema.column_type("rotd50"), Some(ColumnType::Float));
        assert_eq!(schema.categories("rotd50"), None);
        assert_eq!(schema.categories("missing"), None);
    }

    #[test]
    fn probe_is_zero_rows_with_same_schema() {
        let table = readings();
        let schema = SchemaRegistry::from_table(&table, ["imt"]);
        let probe = schema.probe();
        assert!(probe.is_empty());
        assert_eq!(probe.schema(), table.schema());
        assert_eq!(schema.dtype("imt"), Some(DType::Utf8));
        assert!(schema.describes(&table));
        assert!(!schema.describes(&Table::empty_with_schema([("station", DType::Utf8)])));
    }

    #[test]
    fn columns_iterate_in_name_order() {
        let schema = SchemaRegistry::from_table(&readings(), Vec::<String>::new());
        let names = schema.columns().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, vec!["count", "flag", "imt", "rotd50", "station"]);
        assert_eq!(schema.column_type("imt"), Some(ColumnType::String));
    }

    #[test]
    fn column_type_serializes_snake_case() {
        let json = serde_json::to_string(&ColumnType::Categorical).expect("json");
        assert_eq!(json, "\"categorical\"");
    }
}
