#![forbid(unsafe_code)]

//! Restricted `DataFrame.query` dialect over [`Table`] columns.
//!
//! Expressions are parsed into an [`Expr`] tree that can only name columns,
//! literals, operators and a fixed set of numeric functions, then evaluated
//! column-wise. [`validate`] runs the same evaluation against the schema's
//! zero-row probe table, so validation and filtering cannot disagree.

mod parse;
mod validate;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use gm_columnar::{ArithmeticOp, Column, ColumnError, ComparisonOp, LogicalOp};
use gm_frame::{FrameError, Series, Table};
use gm_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use parse::{parse_expr, parse_expr_with_limits};
pub use validate::{
    ErrorKind, FilterError, ValidationResult, apply, apply_with_limits, validate,
    validate_with_limits,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef(pub String);

/// Numeric functions callable from an expression. Nothing else is callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Abs,
    Sqrt,
    Exp,
    Expm1,
    Log,
    Log10,
    Log1p,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Arctan2,
    Sinh,
    Cosh,
    Tanh,
}

impl Function {
    pub const ALL: [Self; 17] = [
        Self::Abs,
        Self::Sqrt,
        Self::Exp,
        Self::Expm1,
        Self::Log,
        Self::Log10,
        Self::Log1p,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Arcsin,
        Self::Arccos,
        Self::Arctan,
        Self::Arctan2,
        Self::Sinh,
        Self::Cosh,
        Self::Tanh,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Expm1 => "expm1",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log1p => "log1p",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Arcsin => "arcsin",
            Self::Arccos => "arccos",
            Self::Arctan => "arctan",
            Self::Arctan2 => "arctan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|function| function.name() == name)
    }

    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Arctan2 => 2,
            _ => 1,
        }
    }

    fn unary_kernel(self) -> Option<fn(f64) -> f64> {
        let kernel: fn(f64) -> f64 = match self {
            Self::Abs => f64::abs,
            Self::Sqrt => f64::sqrt,
            Self::Exp => f64::exp,
            Self::Expm1 => f64::exp_m1,
            Self::Log => f64::ln,
            Self::Log10 => f64::log10,
            Self::Log1p => f64::ln_1p,
            Self::Sin => f64::sin,
            Self::Cos => f64::cos,
            Self::Tan => f64::tan,
            Self::Arcsin => f64::asin,
            Self::Arccos => f64::acos,
            Self::Arctan => f64::atan,
            Self::Sinh => f64::sinh,
            Self::Cosh => f64::cosh,
            Self::Tanh => f64::tanh,
            Self::Arctan2 => return None,
        };
        Some(kernel)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        name: ColumnRef,
    },
    Literal {
        value: Scalar,
    },
    Arith {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg {
        expr: Box<Expr>,
    },
    Pos {
        expr: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        right: Box<Expr>,
        op: ComparisonOp,
    },
    In {
        expr: Box<Expr>,
        values: Vec<Scalar>,
        negated: bool,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Direct sub-expressions, left to right.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Column { .. } | Self::Literal { .. } => Vec::new(),
            Self::Neg { expr } | Self::Pos { expr } | Self::Not { expr } | Self::In { expr, .. } => {
                vec![&**expr]
            }
            Self::Arith { left, right, .. }
            | Self::Compare { left, right, .. }
            | Self::And { left, right }
            | Self::Or { left, right } => vec![&**left, &**right],
            Self::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Height of the tree; a single leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1_usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children().into_iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Column names in source order, repeats included.
    #[must_use]
    pub fn column_references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Column { name } = node {
                out.push(name.0.as_str());
            }
            stack.extend(node.children().into_iter().rev());
        }
        out
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "and" | "or" | "not" | "in" | "True" | "False")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { name } if is_plain_identifier(&name.0) => f.write_str(&name.0),
            Self::Column { name } => write!(f, "`{}`", name.0),
            Self::Literal { value } => write!(f, "{value}"),
            Self::Arith { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Neg { expr } => write!(f, "(-{expr})"),
            Self::Pos { expr } => write!(f, "(+{expr})"),
            Self::Compare { left, right, op } => write!(f, "({left} {op} {right})"),
            Self::In {
                expr,
                values,
                negated,
            } => {
                let items = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let keyword = if *negated { "not in" } else { "in" };
                write!(f, "({expr} {keyword} [{items}])")
            }
            Self::And { left, right } => write!(f, "({left} and {right})"),
            Self::Or { left, right } => write!(f, "({left} or {right})"),
            Self::Not { expr } => write!(f, "(not {expr})"),
            Self::Call { function, args } => {
                let args = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{function}({args})")
            }
        }
    }
}

/// Columns an expression reads.
#[must_use]
pub fn referenced_columns(expr: &Expr) -> BTreeSet<String> {
    expr.column_references()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Columns visible to an expression, borrowed from a table.
#[derive(Debug, Clone, Default)]
pub struct EvalContext<'a> {
    len: usize,
    columns: BTreeMap<&'a str, &'a Column>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    pub fn insert_column(&mut self, name: &'a str, column: &'a Column) -> Result<(), ExprError> {
        if column.len() != self.len {
            return Err(ExprError::Frame(FrameError::LengthMismatch {
                column: name.to_owned(),
                table_len: self.len,
                column_len: column.len(),
            }));
        }
        self.columns.insert(name, column);
        Ok(())
    }

    #[must_use]
    pub fn from_table(table: &'a Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|(name, column)| (name.as_str(), column))
            .collect();
        Self {
            len: table.len(),
            columns,
        }
    }

    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&'a Column> {
        self.columns.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("syntax error at position {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("name '{0}' is not defined")]
    UnknownColumn(String),
    #[error("local variable reference '@{name}' is not allowed (position {offset})")]
    LocalReference { name: String, offset: usize },
    #[error("attribute access is not allowed (position {offset})")]
    AttributeAccess { offset: usize },
    #[error("subscripts are not allowed (position {offset})")]
    Subscript { offset: usize },
    #[error("name '{name}' is reserved")]
    ReservedName { name: String },
    #[error("'{name}' is not a supported function (position {offset})")]
    UnknownFunction { name: String, offset: usize },
    #[error("expression is {len} characters long; the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("{function}() takes {expected} argument(s), {found} given")]
    WrongArity {
        function: Function,
        expected: usize,
        found: usize,
    },
    #[error("filter expression must evaluate to bool, got dtype {0}")]
    NonBooleanMask(DType),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl ExprError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::UnknownColumn(_) => ErrorKind::UnknownColumn,
            Self::LocalReference { .. }
            | Self::AttributeAccess { .. }
            | Self::Subscript { .. }
            | Self::ReservedName { .. }
            | Self::UnknownFunction { .. }
            | Self::TooLong { .. }
            | Self::TooDeep { .. } => ErrorKind::Disallowed,
            Self::WrongArity { .. } | Self::NonBooleanMask(_) => ErrorKind::TypeError,
            Self::Column(err) => column_error_kind(err),
            Self::Frame(FrameError::UnknownColumn(_)) => ErrorKind::UnknownColumn,
            Self::Frame(FrameError::Column(err)) => column_error_kind(err),
            Self::Frame(
                FrameError::LengthMismatch { .. }
                | FrameError::DuplicateColumn(_)
                | FrameError::MaskLengthMismatch { .. },
            ) => ErrorKind::Other,
        }
    }
}

fn column_error_kind(err: &ColumnError) -> ErrorKind {
    match err {
        ColumnError::NonNumeric { .. }
        | ColumnError::Incomparable { .. }
        | ColumnError::NonBoolean { .. }
        | ColumnError::Type(_) => ErrorKind::TypeError,
        ColumnError::LengthMismatch { .. } => ErrorKind::Other,
    }
}

fn ensure_columns(expr: &Expr, context: &EvalContext<'_>) -> Result<(), ExprError> {
    match expr
        .column_references()
        .into_iter()
        .find(|name| context.get_column(name).is_none())
    {
        Some(missing) => Err(ExprError::UnknownColumn(missing.to_owned())),
        None => Ok(()),
    }
}

/// Evaluate `expr` column-wise. Every referenced column is checked before
/// any kernel runs, so an unknown name wins over a type error elsewhere.
pub fn evaluate(expr: &Expr, context: &EvalContext<'_>) -> Result<Series, ExprError> {
    ensure_columns(expr, context)?;
    let column = eval_column(expr, context)?.into_owned();
    let name = match expr {
        Expr::Column { name } => name.0.clone(),
        other => other.to_string(),
    };
    Ok(Series::new(name, column))
}

pub fn evaluate_on_table(expr: &Expr, table: &Table) -> Result<Series, ExprError> {
    let context = EvalContext::from_table(table);
    evaluate(expr, &context)
}

/// Keep the rows where `expr` is true. The result must have dtype bool;
/// missing values exclude the row.
pub fn filter_table_on_expr(expr: &Expr, table: &Table) -> Result<Table, ExprError> {
    let mask = evaluate_on_table(expr, table)?;
    if mask.dtype() != DType::Bool {
        return Err(ExprError::NonBooleanMask(mask.dtype()));
    }
    table.filter_rows(mask.column()).map_err(ExprError::from)
}

/// Evaluate a string expression against a table.
///
/// Analogous to `pandas.DataFrame.eval(expr_str)` restricted to the dialect
/// this crate parses.
pub fn eval_str(expr_str: &str, table: &Table) -> Result<Series, ExprError> {
    let expr = parse_expr(expr_str)?;
    evaluate_on_table(&expr, table)
}

/// Filter a table using a string expression.
///
/// Analogous to `pandas.DataFrame.query(expr_str)`.
pub fn query_str(expr_str: &str, table: &Table) -> Result<Table, ExprError> {
    let expr = parse_expr(expr_str)?;
    filter_table_on_expr(&expr, table)
}

fn eval_column<'a>(expr: &Expr, context: &EvalContext<'a>) -> Result<Cow<'a, Column>, ExprError> {
    let out = match expr {
        Expr::Column { name } => {
            return context
                .get_column(&name.0)
                .map(Cow::Borrowed)
                .ok_or_else(|| ExprError::UnknownColumn(name.0.clone()));
        }
        Expr::Literal { value } => Column::broadcast(value, context.len()),
        Expr::Arith { op, left, right } => {
            let lhs = eval_column(left, context)?;
            let rhs = eval_column(right, context)?;
            lhs.binary_numeric(&rhs, *op)?
        }
        Expr::Neg { expr } => eval_column(expr, context)?.negate()?,
        Expr::Pos { expr } => {
            let input = eval_column(expr, context)?;
            let dtype = input.dtype();
            if !(dtype.is_numeric() || dtype == DType::Null) {
                return Err(ColumnError::NonNumeric {
                    op: "unary +".to_owned(),
                    dtype,
                }
                .into());
            }
            return Ok(input);
        }
        Expr::Compare { left, right, op } => evaluate_comparison(left, right, *op, context)?,
        Expr::In {
            expr,
            values,
            negated,
        } => eval_column(expr, context)?.is_in(values, *negated)?,
        Expr::And { left, right } => {
            let lhs = eval_column(left, context)?;
            let rhs = eval_column(right, context)?;
            lhs.logical(&rhs, LogicalOp::And)?
        }
        Expr::Or { left, right } => {
            let lhs = eval_column(left, context)?;
            let rhs = eval_column(right, context)?;
            lhs.logical(&rhs, LogicalOp::Or)?
        }
        Expr::Not { expr } => eval_column(expr, context)?.not()?,
        Expr::Call { function, args } => {
            let inputs = args
                .iter()
                .map(|arg| eval_column(arg, context))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(*function, &inputs)?
        }
    };
    Ok(Cow::Owned(out))
}

fn call_function(function: Function, args: &[Cow<'_, Column>]) -> Result<Column, ExprError> {
    let out = match (function.unary_kernel(), args) {
        (Some(kernel), [arg]) => arg.map_f64(function.name(), kernel)?,
        (None, [y, x]) => y.zip_f64(x, function.name(), f64::atan2)?,
        _ => {
            return Err(ExprError::WrongArity {
                function,
                expected: function.arity(),
                found: args.len(),
            });
        }
    };
    Ok(out)
}

fn evaluate_comparison(
    left: &Expr,
    right: &Expr,
    op: ComparisonOp,
    context: &EvalContext<'_>,
) -> Result<Column, ExprError> {
    let out = match (left, right) {
        (Expr::Literal { .. }, Expr::Literal { .. }) => {
            let lhs = eval_column(left, context)?;
            let rhs = eval_column(right, context)?;
            lhs.compare(&rhs, op)?
        }
        (Expr::Literal { value }, right_expr) => {
            eval_column(right_expr, context)?.compare_scalar(value, op.reversed())?
        }
        (left_expr, Expr::Literal { value }) => {
            eval_column(left_expr, context)?.compare_scalar(value, op)?
        }
        (left_expr, right_expr) => {
            let lhs = eval_column(left_expr, context)?;
            let rhs = eval_column(right_expr, context)?;
            lhs.compare(&rhs, op)?
        }
    };
    Ok(out)
}
