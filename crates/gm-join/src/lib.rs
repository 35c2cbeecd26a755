#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use gm_columnar::ColumnError;
use gm_frame::{FrameError, Table};
use gm_types::{DType, Scalar};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("{side} table has no key column '{key}'")]
    MissingKey { side: &'static str, key: String },
    #[error("key column '{key}' has dtype {dtype}; joins need int64 or str keys")]
    UnsupportedKeyDtype { key: String, dtype: DType },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum JoinKey<'a> {
    Int64(i64),
    Utf8(&'a str),
}

impl<'a> JoinKey<'a> {
    fn from_scalar(value: &'a Scalar) -> Option<Self> {
        match value {
            Scalar::Int64(v) => Some(Self::Int64(*v)),
            Scalar::Utf8(v) => Some(Self::Utf8(v)),
            _ => None,
        }
    }
}

fn key_column<'t>(
    table: &'t Table,
    key: &str,
    side: &'static str,
) -> Result<&'t [Scalar], JoinError> {
    let column = table.column(key).ok_or_else(|| JoinError::MissingKey {
        side,
        key: key.to_owned(),
    })?;
    if !matches!(column.dtype(), DType::Int64 | DType::Utf8 | DType::Null) {
        return Err(JoinError::UnsupportedKeyDtype {
            key: key.to_owned(),
            dtype: column.dtype(),
        });
    }
    Ok(column.values())
}

/// Inner-join `right` onto `left` by equal values of `key`.
///
/// The output keeps left row order; each left row appears once per matching
/// right row and unmatched left rows are dropped. Right columns other than the
/// key are appended, with a `_right` suffix when their name collides with a
/// left column. Missing keys never match.
pub fn join_on_key(left: &Table, right: &Table, key: &str) -> Result<Table, JoinError> {
    let left_keys = key_column(left, key, "left")?;
    let right_keys = key_column(right, key, "right")?;

    let mut right_map = HashMap::<JoinKey<'_>, Vec<usize>>::new();
    for (pos, value) in right_keys.iter().enumerate() {
        if let Some(join_key) = JoinKey::from_scalar(value) {
            right_map.entry(join_key).or_default().push(pos);
        }
    }

    let mut left_positions = Vec::new();
    let mut right_positions = Vec::new();

    for (left_pos, value) in left_keys.iter().enumerate() {
        let matches = JoinKey::from_scalar(value).and_then(|join_key| right_map.get(&join_key));
        for right_pos in matches.into_iter().flatten() {
            left_positions.push(left_pos);
            right_positions.push(*right_pos);
        }
    }

    let mut columns = BTreeMap::new();
    for (name, column) in left.columns() {
        columns.insert(name.clone(), column.take(&left_positions)?);
    }
    for (name, column) in right.columns() {
        if name == key {
            continue;
        }
        let out_name = if left.column(name).is_some() {
            format!("{name}_right")
        } else {
            name.clone()
        };
        columns.insert(out_name, column.take(&right_positions)?);
    }

    Ok(Table::new(columns)?)
}
