//! Classification of expression failures, and the two entry points the
//! request handlers use: [`validate`] against the schema probe and [`apply`]
//! against real data. Both run the same parse and filter path.

use std::fmt;

use gm_frame::Table;
use gm_runtime::EvalLimits;
use gm_schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ExprError, filter_table_on_expr, parse_expr_with_limits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    UnknownColumn,
    TypeError,
    /// Security violations and limit breaches.
    Disallowed,
    Other,
}

impl ErrorKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnknownColumn => "unknown_column",
            Self::TypeError => "type_error",
            Self::Disallowed => "disallowed",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationResult {
    Valid,
    Invalid { kind: ErrorKind, message: String },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Valid => None,
            Self::Invalid { kind, .. } => Some(*kind),
        }
    }
}

impl From<&ExprError> for ValidationResult {
    fn from(err: &ExprError) -> Self {
        Self::Invalid {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A classified failure while filtering real data.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FilterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<ExprError> for FilterError {
    fn from(err: ExprError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

fn run_filter(input: &str, table: &Table, limits: &EvalLimits) -> Result<Table, ExprError> {
    let expr = parse_expr_with_limits(input, limits)?;
    filter_table_on_expr(&expr, table)
}

/// Check `input` against the schema without touching any data.
pub fn validate(input: &str, schema: &SchemaRegistry) -> ValidationResult {
    validate_with_limits(input, schema, &EvalLimits::default())
}

pub fn validate_with_limits(
    input: &str,
    schema: &SchemaRegistry,
    limits: &EvalLimits,
) -> ValidationResult {
    if input.trim().is_empty() {
        return ValidationResult::Valid;
    }
    match run_filter(input, schema.probe(), limits) {
        Ok(_) => ValidationResult::Valid,
        Err(err) => ValidationResult::from(&err),
    }
}

/// Filter `table` by `input`. An empty or blank expression keeps every row.
pub fn apply(input: &str, table: &Table) -> Result<Table, FilterError> {
    apply_with_limits(input, table, &EvalLimits::default())
}

pub fn apply_with_limits(
    input: &str,
    table: &Table,
    limits: &EvalLimits,
) -> Result<Table, FilterError> {
    if input.trim().is_empty() {
        return Ok(table.clone());
    }
    run_filter(input, table, limits).map_err(FilterError::from)
}
