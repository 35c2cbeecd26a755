#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use gm_types::{DType, NullKind, Scalar, TypeError, cast_scalar_owned, common_dtype, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl ArithmeticOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::FloorDiv => (lhs / rhs).floor(),
            // Python semantics: the result takes the sign of the divisor.
            Self::Mod => lhs - rhs * (lhs / rhs).floor(),
            Self::Pow => lhs.powf(rhs),
        }
    }

    /// Exact integer result, `None` when it is not an int64 (overflow, a zero
    /// divisor, a negative exponent, or true division).
    fn apply_i64(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            Self::Add => lhs.checked_add(rhs),
            Self::Sub => lhs.checked_sub(rhs),
            Self::Mul => lhs.checked_mul(rhs),
            Self::Div => None,
            Self::FloorDiv => {
                let quotient = lhs.checked_div(rhs)?;
                if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
                    quotient.checked_sub(1)
                } else {
                    Some(quotient)
                }
            }
            Self::Mod => {
                let rem = lhs.checked_rem(rhs)?;
                if rem != 0 && (rem < 0) != (rhs < 0) {
                    Some(rem + rhs)
                } else {
                    Some(rem)
                }
            }
            Self::Pow => lhs.checked_pow(u32::try_from(rhs).ok()?),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Ne,
    Ge,
    Le,
}

impl ComparisonOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// The operator that gives the same answer with its operands swapped.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Lt => Self::Gt,
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Ge => Self::Le,
            Self::Le => Self::Ge,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("unsupported operand dtype {dtype} for {op}")]
    NonNumeric { op: String, dtype: DType },
    #[error("invalid comparison between dtype={left} and {right} using {op}")]
    Incomparable {
        left: DType,
        right: DType,
        op: ComparisonOp,
    },
    #[error("{op} requires bool operands, found dtype {dtype}")]
    NonBoolean { op: String, dtype: DType },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Type families used for comparison admissibility: numbers (bool included)
/// compare with numbers, strings with strings, missing with anything.
fn comparable(left: DType, right: DType) -> bool {
    match (left, right) {
        (DType::Null, _) | (_, DType::Null) => true,
        (DType::Utf8, DType::Utf8) => true,
        (l, r) => l.is_numeric() && r.is_numeric(),
    }
}

fn ensure_numeric(dtype: DType, op: &str) -> Result<(), ColumnError> {
    if dtype.is_numeric() || dtype == DType::Null {
        Ok(())
    } else {
        Err(ColumnError::NonNumeric {
            op: op.to_owned(),
            dtype,
        })
    }
}

fn ensure_boolean(dtype: DType, op: &str) -> Result<(), ColumnError> {
    if matches!(dtype, DType::Bool | DType::Null) {
        Ok(())
    } else {
        Err(ColumnError::NonBoolean {
            op: op.to_owned(),
            dtype,
        })
    }
}

fn compare_present(left: &Scalar, right: &Scalar, op: ComparisonOp) -> Result<bool, ColumnError> {
    if left.is_missing() || right.is_missing() {
        return Ok(op == ComparisonOp::Ne);
    }
    let ordering = match (left, right) {
        (Scalar::Utf8(l), Scalar::Utf8(r)) => l.cmp(r),
        _ => match (integral(left), integral(right)) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => {
                let lhs = left.to_f64()?;
                let rhs = right.to_f64()?;
                lhs.partial_cmp(&rhs).unwrap_or(Ordering::Less)
            }
        },
    };
    Ok(op.holds(ordering))
}

/// Exact integer value of an int64 or bool cell.
fn integral(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Int64(v) => Some(*v),
        Scalar::Bool(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn truthy(value: &Scalar) -> bool {
    matches!(value, Scalar::Bool(true))
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let needs_coercion = values.iter().any(|v| {
            let d = v.dtype();
            d != dtype && d != DType::Null
        });

        let coerced = if needs_coercion {
            values
                .into_iter()
                .map(|value| cast_scalar_owned(value, dtype))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            values
                .into_iter()
                .map(|value| match value {
                    Scalar::Null(_) => Scalar::missing_for_dtype(dtype),
                    other => other,
                })
                .collect()
        };

        Ok(Self {
            dtype,
            values: coerced,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    /// A zero-length column that still carries its dtype.
    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        Self {
            dtype,
            values: Vec::new(),
        }
    }

    /// Repeat `value` `len` times; the column dtype is the scalar's dtype.
    #[must_use]
    pub fn broadcast(value: &Scalar, len: usize) -> Self {
        let dtype = value.dtype();
        Self {
            dtype,
            values: vec![value.clone(); len],
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    /// Gather rows by position; out-of-range positions become missing.
    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|idx| {
                self.values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype))
            })
            .collect::<Vec<_>>();
        Self::new(self.dtype, values)
    }

    /// Positions holding `true` in a boolean column. Missing counts as false.
    pub fn mask_positions(&self) -> Result<Vec<usize>, ColumnError> {
        ensure_boolean(self.dtype, "row mask")?;
        Ok(self
            .values
            .iter()
            .enumerate()
            .filter_map(|(idx, value)| truthy(value).then_some(idx))
            .collect())
    }

    pub fn binary_numeric(&self, right: &Self, op: ArithmeticOp) -> Result<Self, ColumnError> {
        ensure_numeric(self.dtype, op.symbol())?;
        ensure_numeric(right.dtype, op.symbol())?;
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let mut out_dtype = common_dtype(self.dtype, right.dtype)?;
        if matches!(out_dtype, DType::Bool | DType::Null) {
            out_dtype = DType::Int64;
        }
        if matches!(op, ArithmeticOp::Div) {
            out_dtype = DType::Float64;
        }

        if out_dtype == DType::Float64 {
            let values = self
                .values
                .iter()
                .zip(&right.values)
                .map(|(left, right)| {
                    if left.is_missing() || right.is_missing() {
                        return Ok::<_, ColumnError>(Scalar::Null(NullKind::NaN));
                    }
                    Ok(Scalar::Float64(op.apply(left.to_f64()?, right.to_f64()?)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Self::new(DType::Float64, values);
        }

        // Integer operands stay exact. A row whose result leaves int64
        // (overflow, x // 0, negative powers) turns the column into float64.
        let mut promoted = false;
        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(left, right)| {
                if left.is_missing() || right.is_missing() {
                    promoted = true;
                    return Ok::<_, ColumnError>(Scalar::Null(NullKind::NaN));
                }
                match (integral(left), integral(right)) {
                    (Some(l), Some(r)) => Ok(match op.apply_i64(l, r) {
                        Some(v) => Scalar::Int64(v),
                        None => {
                            promoted = true;
                            Scalar::Float64(op.apply(l as f64, r as f64))
                        }
                    }),
                    _ => {
                        promoted = true;
                        Ok(Scalar::Float64(op.apply(left.to_f64()?, right.to_f64()?)))
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if promoted {
            let values = values
                .into_iter()
                .map(|value| match value {
                    Scalar::Int64(v) => Scalar::Float64(v as f64),
                    other => other,
                })
                .collect();
            Self::new(DType::Float64, values)
        } else {
            Self::new(DType::Int64, values)
        }
    }

    pub fn compare(&self, right: &Self, op: ComparisonOp) -> Result<Self, ColumnError> {
        if !comparable(self.dtype, right.dtype) {
            return Err(ColumnError::Incomparable {
                left: self.dtype,
                right: right.dtype,
                op,
            });
        }
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| compare_present(l, r, op).map(Scalar::Bool))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(DType::Bool, values)
    }

    pub fn compare_scalar(&self, value: &Scalar, op: ComparisonOp) -> Result<Self, ColumnError> {
        if !comparable(self.dtype, value.dtype()) {
            return Err(ColumnError::Incomparable {
                left: self.dtype,
                right: value.dtype(),
                op,
            });
        }

        let values = self
            .values
            .iter()
            .map(|l| compare_present(l, value, op).map(Scalar::Bool))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(DType::Bool, values)
    }

    /// Membership test against a literal list. Missing values are never members.
    pub fn is_in(&self, candidates: &[Scalar], negated: bool) -> Result<Self, ColumnError> {
        for candidate in candidates {
            if !comparable(self.dtype, candidate.dtype()) {
                return Err(ColumnError::Incomparable {
                    left: self.dtype,
                    right: candidate.dtype(),
                    op: ComparisonOp::Eq,
                });
            }
        }

        let values = self
            .values
            .iter()
            .map(|value| {
                let mut member = false;
                for candidate in candidates {
                    if compare_present(value, candidate, ComparisonOp::Eq)? {
                        member = true;
                        break;
                    }
                }
                Ok::<_, ColumnError>(Scalar::Bool(member != negated))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(DType::Bool, values)
    }

    pub fn logical(&self, right: &Self, op: LogicalOp) -> Result<Self, ColumnError> {
        let name = match op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        };
        ensure_boolean(self.dtype, name)?;
        ensure_boolean(right.dtype, name)?;
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| {
                let out = match op {
                    LogicalOp::And => truthy(l) && truthy(r),
                    LogicalOp::Or => truthy(l) || truthy(r),
                };
                Scalar::Bool(out)
            })
            .collect();
        Self::new(DType::Bool, values)
    }

    pub fn not(&self) -> Result<Self, ColumnError> {
        ensure_boolean(self.dtype, "not")?;
        let values = self
            .values
            .iter()
            .map(|value| Scalar::Bool(!truthy(value)))
            .collect();
        Self::new(DType::Bool, values)
    }

    pub fn negate(&self) -> Result<Self, ColumnError> {
        ensure_numeric(self.dtype, "unary -")?;
        let out_dtype = match self.dtype {
            DType::Float64 => DType::Float64,
            _ => DType::Int64,
        };
        let values = self
            .values
            .iter()
            .map(|value| match value {
                Scalar::Bool(v) => Scalar::Int64(-i64::from(*v)),
                Scalar::Int64(v) => v
                    .checked_neg()
                    .map_or(Scalar::Float64(-(*v as f64)), Scalar::Int64),
                Scalar::Float64(v) => Scalar::Float64(-v),
                _ => Scalar::missing_for_dtype(out_dtype),
            })
            .collect::<Vec<_>>();
        if values.iter().any(|v| matches!(v, Scalar::Float64(_))) {
            Self::new(DType::Float64, values)
        } else {
            Self::new(out_dtype, values)
        }
    }

    /// Apply a float function elementwise; the result is always float64.
    pub fn map_f64(&self, name: &str, f: impl Fn(f64) -> f64) -> Result<Self, ColumnError> {
        ensure_numeric(self.dtype, name)?;
        let values = self
            .values
            .iter()
            .map(|value| {
                if value.is_missing() {
                    Ok(Scalar::Null(NullKind::NaN))
                } else {
                    value.to_f64().map(|v| Scalar::Float64(f(v)))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(DType::Float64, values)
    }

    /// Two-argument counterpart of [`Column::map_f64`].
    pub fn zip_f64(
        &self,
        right: &Self,
        name: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, ColumnError> {
        ensure_numeric(self.dtype, name)?;
        ensure_numeric(right.dtype, name)?;
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }
        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| {
                if l.is_missing() || r.is_missing() {
                    Ok(Scalar::Null(NullKind::NaN))
                } else {
                    Ok::<_, ColumnError>(Scalar::Float64(f(l.to_f64()?, r.to_f64()?)))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(DType::Float64, values)
    }

    /// Mean of the present values, `None` for non-numeric or all-missing columns.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if !self.dtype.is_numeric() {
            return None;
        }
        let (sum, count) = self
            .values
            .iter()
            .filter_map(|value| value.to_f64().ok())
            .filter(|v| !v.is_nan())
            .fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }
}

#[cfg(test)]
mod tests {
    use gm_types::{DType, NullKind, Scalar};

    use super::{ArithmeticOp, Column, ColumnError, ComparisonOp, LogicalOp};

    fn floats(values: &[f64]) -> Column {
        Column::from_values(values.iter().copied().map(Scalar::Float64).collect()).expect("floats")
    }

    #[test]
    fn take_injects_missing_values() {
        let column = Column::from_values(vec![Scalar::Int64(10), Scalar::Int64(20)])
            .expect("column should build");

        let out = column.take(&[1, 7, 0]).expect("take should work");

        assert_eq!(
            out.values(),
            &[
                Scalar::Int64(20),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(10)
            ]
        );
    }

    #[test]
    fn numeric_addition_propagates_missing() {
        let left = Column::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(f64::NAN),
        ])
        .expect("left");
        let right = Column::from_values(vec![Scalar::Int64(2), Scalar::Int64(5), Scalar::Int64(3)])
            .expect("right");

        let out = left
            .binary_numeric(&right, ArithmeticOp::Add)
            .expect("add should pass");

        assert_eq!(out.values()[0], Scalar::Float64(3.0));
        assert!(out.values()[1].is_nan());
        assert!(out.values()[2].is_nan());
    }

    #[test]
    fn integer_modulo_by_zero_promotes_to_float() {
        let left = Column::from_values(vec![Scalar::Int64(7), Scalar::Int64(8)]).expect("left");
        let right = Column::from_values(vec![Scalar::Int64(2), Scalar::Int64(0)]).expect("right");

        let out = left
            .binary_numeric(&right, ArithmeticOp::Mod)
            .expect("mod should pass");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.values()[0], Scalar::Float64(1.0));
        assert!(out.values()[1].is_nan());
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        let out = floats(&[-7.0])
            .binary_numeric(&floats(&[3.0]), ArithmeticOp::Mod)
            .expect("mod");
        assert_eq!(out.values(), &[Scalar::Float64(2.0)]);
    }

    #[test]
    fn int64_arithmetic_is_exact_above_two_pow_53() {
        let ids = Column::from_values(vec![Scalar::Int64(9_007_199_254_740_993)]).expect("ids");
        let one = Column::from_values(vec![Scalar::Int64(1)]).expect("one");

        let out = ids.binary_numeric(&one, ArithmeticOp::Add).expect("add");
        assert_eq!(out.dtype(), DType::Int64);
        assert_eq!(out.values(), &[Scalar::Int64(9_007_199_254_740_994)]);

        let ne = ids
            .compare_scalar(&Scalar::Int64(9_007_199_254_740_992), ComparisonOp::Ne)
            .expect("ne");
        assert_eq!(ne.values(), &[Scalar::Bool(true)]);
        let eq = ids
            .compare_scalar(&Scalar::Int64(9_007_199_254_740_992), ComparisonOp::Eq)
            .expect("eq");
        assert_eq!(eq.values(), &[Scalar::Bool(false)]);
    }

    #[test]
    fn int64_overflow_promotes_instead_of_saturating() {
        let big = Column::from_values(vec![Scalar::Int64(1 << 62), Scalar::Int64(3)])
            .expect("big");
        let two = Column::from_values(vec![Scalar::Int64(2), Scalar::Int64(2)]).expect("two");

        let out = big.binary_numeric(&two, ArithmeticOp::Mul).expect("mul");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(
            out.values(),
            &[Scalar::Float64(9.223_372_036_854_776e18), Scalar::Float64(6.0)]
        );
    }

    #[test]
    fn integer_floor_division_and_modulo_round_toward_negative_infinity() {
        let left = Column::from_values(vec![Scalar::Int64(-7), Scalar::Int64(7)]).expect("left");
        let right = Column::from_values(vec![Scalar::Int64(2), Scalar::Int64(-2)]).expect("right");

        let quotient = left
            .binary_numeric(&right, ArithmeticOp::FloorDiv)
            .expect("floordiv");
        assert_eq!(quotient.values(), &[Scalar::Int64(-4), Scalar::Int64(-4)]);

        let remainder = left.binary_numeric(&right, ArithmeticOp::Mod).expect("mod");
        assert_eq!(remainder.values(), &[Scalar::Int64(1), Scalar::Int64(-1)]);
    }

    #[test]
    fn arithmetic_on_strings_fails_even_without_rows() {
        let err = Column::empty(DType::Utf8)
            .binary_numeric(&Column::empty(DType::Float64), ArithmeticOp::Mul)
            .expect_err("strings are not numeric");
        assert!(matches!(
            err,
            ColumnError::NonNumeric {
                dtype: DType::Utf8,
                ..
            }
        ));
    }

    #[test]
    fn string_number_comparison_is_rejected_on_dtype() {
        let err = Column::empty(DType::Utf8)
            .compare_scalar(&Scalar::Int64(1), ComparisonOp::Eq)
            .expect_err("str vs int");
        assert_eq!(
            err.to_string(),
            "invalid comparison between dtype=str and int64 using =="
        );
    }

    #[test]
    fn comparisons_with_missing_are_false_except_ne() {
        let column = floats(&[1.0, f64::NAN]);
        let gt = column
            .compare_scalar(&Scalar::Float64(0.0), ComparisonOp::Gt)
            .expect("gt");
        assert_eq!(gt.values(), &[Scalar::Bool(true), Scalar::Bool(false)]);

        let ne = column
            .compare_scalar(&Scalar::Float64(1.0), ComparisonOp::Ne)
            .expect("ne");
        assert_eq!(ne.values(), &[Scalar::Bool(false), Scalar::Bool(true)]);
    }

    #[test]
    fn strings_compare_lexicographically() {
        let column = Column::from_values(vec!["PGA".into(), "PGV".into()]).expect("strings");
        let out = column
            .compare_scalar(&"PGB".into(), ComparisonOp::Lt)
            .expect("lt");
        assert_eq!(out.values(), &[Scalar::Bool(true), Scalar::Bool(false)]);
    }

    #[test]
    fn logical_ops_treat_missing_as_false() {
        let left = Column::from_values(vec![
            Scalar::Bool(true),
            Scalar::Bool(true),
            Scalar::Null(NullKind::Null),
        ])
        .expect("left");
        let right = Column::from_values(vec![
            Scalar::Bool(true),
            Scalar::Bool(false),
            Scalar::Bool(true),
        ])
        .expect("right");

        let and = left.logical(&right, LogicalOp::And).expect("and");
        assert_eq!(
            and.values(),
            &[Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false)]
        );
        let or = left.logical(&right, LogicalOp::Or).expect("or");
        assert_eq!(
            or.values(),
            &[Scalar::Bool(true), Scalar::Bool(true), Scalar::Bool(true)]
        );
    }

    #[test]
    fn logical_ops_reject_numeric_operands() {
        let err = floats(&[1.0])
            .logical(&floats(&[0.0]), LogicalOp::Or)
            .expect_err("numeric and");
        assert!(matches!(err, ColumnError::NonBoolean { .. }));
    }

    #[test]
    fn is_in_matches_across_numeric_dtypes() {
        let column = Column::from_values(vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)])
            .expect("ints");
        let out = column
            .is_in(&[Scalar::Float64(1.0), Scalar::Int64(3)], false)
            .expect("isin");
        assert_eq!(
            out.values(),
            &[Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(true)]
        );
        let negated = column.is_in(&[Scalar::Int64(3)], true).expect("not in");
        assert_eq!(
            negated.values(),
            &[Scalar::Bool(true), Scalar::Bool(true), Scalar::Bool(false)]
        );
    }

    #[test]
    fn mask_positions_skip_false_and_missing() {
        let mask = Column::from_values(vec![
            Scalar::Bool(false),
            Scalar::Bool(true),
            Scalar::Null(NullKind::Null),
            Scalar::Bool(true),
        ])
        .expect("mask");
        assert_eq!(mask.mask_positions().expect("positions"), vec![1, 3]);
        assert!(floats(&[1.0]).mask_positions().is_err());
    }

    #[test]
    fn mean_ignores_missing_values() {
        assert_eq!(floats(&[1.0, f64::NAN, 3.0]).mean(), Some(2.0));
        assert_eq!(Column::empty(DType::Float64).mean(), None);
        assert_eq!(Column::empty(DType::Utf8).mean(), None);
    }

    #[test]
    fn negate_keeps_integers_integral() {
        let out = Column::from_values(vec![Scalar::Int64(2), Scalar::Bool(true)])
            .expect("ints")
            .negate()
            .expect("negate");
        assert_eq!(out.values(), &[Scalar::Int64(-2), Scalar::Int64(-1)]);
    }
}
