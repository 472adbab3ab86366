//! Scalar expression evaluation over one row
//!
//! NULL propagates through operators and functions; AND, OR and NOT follow
//! SQL three-valued logic. Runtime failures such as division by zero are
//! reported as evaluation errors.

use crate::core::{SemanticError, Value};
use crate::parser::{BinaryOp, UnaryOp};
use crate::planner::{BoundExpr, ScalarFunction};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;

fn error(message: impl Into<String>) -> SemanticError {
    SemanticError::Evaluation(message.into())
}

fn type_name(value: &Value) -> String {
    value
        .data_type()
        .map_or_else(|| "NULL".to_string(), |t| t.to_string())
}

pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(expr: &BoundExpr, row: &[Value]) -> Result<Value, SemanticError> {
        match expr {
            BoundExpr::Literal(value) => Ok(value.clone()),
            BoundExpr::Column(idx) => row
                .get(*idx)
                .cloned()
                .ok_or_else(|| error(format!("column position {idx} out of range"))),
            BoundExpr::Unary { op, expr } => {
                let value = Self::evaluate(expr, row)?;
                match op {
                    UnaryOp::Not => Ok(match Self::truth(&value)? {
                        Some(b) => Value::Boolean(!b),
                        None => Value::Null,
                    }),
                    UnaryOp::Neg => Self::negate(&value),
                }
            }
            BoundExpr::Binary { left, op, right } => match op {
                BinaryOp::And | BinaryOp::Or => Self::logical(*op, left, right, row),
                _ => {
                    let l = Self::evaluate(left, row)?;
                    let r = Self::evaluate(right, row)?;
                    Self::binary(*op, &l, &r)
                }
            },
            BoundExpr::IsNull { expr, negated } => {
                let value = Self::evaluate(expr, row)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
            BoundExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = Self::evaluate(expr, row)?;
                let above = Self::compare(BinaryOp::GtEq, &value, &Self::evaluate(low, row)?)?;
                let below = Self::compare(BinaryOp::LtEq, &value, &Self::evaluate(high, row)?)?;
                let within = and3(Self::truth(&above)?, Self::truth(&below)?);
                Ok(negate3(within, *negated))
            }
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let value = Self::evaluate(expr, row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let item = Self::evaluate(item, row)?;
                    match Self::truth(&Self::compare(BinaryOp::Eq, &value, &item)?)? {
                        Some(true) => return Ok(Value::Boolean(!negated)),
                        Some(false) => {}
                        None => saw_null = true,
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                })
            }
            BoundExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = Self::evaluate(expr, row)?;
                let pattern = Self::evaluate(pattern, row)?;
                match (&value, &pattern) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Text(text), Value::Text(pattern)) => {
                        Ok(Value::Boolean(like_match(text, pattern) != *negated))
                    }
                    _ => Err(error(format!(
                        "LIKE expects TEXT operands, got {} and {}",
                        type_name(&value),
                        type_name(&pattern)
                    ))),
                }
            }
            BoundExpr::Cast { expr, data_type } => {
                Self::evaluate(expr, row)?.cast(*data_type).map_err(error)
            }
            BoundExpr::Function { func, args } => {
                let args = args
                    .iter()
                    .map(|a| Self::evaluate(a, row))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::call(*func, args)
            }
        }
    }

    /// Evaluates a predicate; NULL counts as false
    pub fn is_true(expr: &BoundExpr, row: &[Value]) -> Result<bool, SemanticError> {
        Ok(Self::truth(&Self::evaluate(expr, row)?)? == Some(true))
    }

    fn truth(value: &Value) -> Result<Option<bool>, SemanticError> {
        match value {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            other => Err(error(format!(
                "expected a BOOLEAN condition, got {}",
                type_name(other)
            ))),
        }
    }

    fn logical(
        op: BinaryOp,
        left: &BoundExpr,
        right: &BoundExpr,
        row: &[Value],
    ) -> Result<Value, SemanticError> {
        let l = Self::truth(&Self::evaluate(left, row)?)?;
        // Short-circuit once the result is decided
        match (op, l) {
            (BinaryOp::And, Some(false)) => return Ok(Value::Boolean(false)),
            (BinaryOp::Or, Some(true)) => return Ok(Value::Boolean(true)),
            _ => {}
        }
        let r = Self::truth(&Self::evaluate(right, row)?)?;
        let result = if op == BinaryOp::And {
            and3(l, r)
        } else {
            or3(l, r)
        };
        Ok(result.map_or(Value::Null, Value::Boolean))
    }

    pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, SemanticError> {
        if op.is_comparison() {
            return Self::compare(op, left, right);
        }
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }
        match op {
            BinaryOp::Concat => Ok(Value::Text(format!("{left}{right}"))),
            BinaryOp::Plus
            | BinaryOp::Minus
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => Self::arithmetic(op, left, right),
            _ => Err(error(format!("operator {op:?} is not a value operator"))),
        }
    }

    fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, SemanticError> {
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }
        let ordering = left.sql_cmp(right).ok_or_else(|| {
            error(format!(
                "cannot compare {} with {}",
                type_name(left),
                type_name(right)
            ))
        })?;
        let result = match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::NotEq => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::LtEq => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::GtEq => ordering != Ordering::Less,
            _ => return Err(error(format!("operator {op:?} is not a comparison"))),
        };
        Ok(Value::Boolean(result))
    }

    /// `+ - * / %` on two non-null numbers.
    ///
    /// Integers stay integers (checked for overflow, division truncates);
    /// a float operand makes the result a float, otherwise a decimal
    /// operand makes it a decimal.
    pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, SemanticError> {
        let unsupported = || {
            error(format!(
                "operator {} is not defined for {} and {}",
                op_symbol(op),
                type_name(left),
                type_name(right)
            ))
        };

        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                let (a, b) = (*a, *b);
                if b == 0 && matches!(op, BinaryOp::Divide | BinaryOp::Modulo) {
                    return Err(error("division by zero"));
                }
                let result = match op {
                    BinaryOp::Plus => a.checked_add(b),
                    BinaryOp::Minus => a.checked_sub(b),
                    BinaryOp::Multiply => a.checked_mul(b),
                    BinaryOp::Divide => a.checked_div(b),
                    BinaryOp::Modulo => a.checked_rem(b),
                    _ => return Err(unsupported()),
                };
                result
                    .map(Value::Integer)
                    .ok_or_else(|| error("integer out of range"))
            }
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                    return Err(unsupported());
                };
                if b == 0.0 && matches!(op, BinaryOp::Divide | BinaryOp::Modulo) {
                    return Err(error("division by zero"));
                }
                let result = match op {
                    BinaryOp::Plus => a + b,
                    BinaryOp::Minus => a - b,
                    BinaryOp::Multiply => a * b,
                    BinaryOp::Divide => a / b,
                    BinaryOp::Modulo => a % b,
                    _ => return Err(unsupported()),
                };
                Ok(Value::Float(result))
            }
            (Value::Decimal(_) | Value::Integer(_), Value::Decimal(_) | Value::Integer(_)) => {
                let (Some(a), Some(b)) = (to_decimal(left), to_decimal(right)) else {
                    return Err(unsupported());
                };
                if b.is_zero() && matches!(op, BinaryOp::Divide | BinaryOp::Modulo) {
                    return Err(error("division by zero"));
                }
                let result = match op {
                    BinaryOp::Plus => a.checked_add(b),
                    BinaryOp::Minus => a.checked_sub(b),
                    BinaryOp::Multiply => a.checked_mul(b),
                    BinaryOp::Divide => a.checked_div(b),
                    BinaryOp::Modulo => a.checked_rem(b),
                    _ => return Err(unsupported()),
                };
                result
                    .map(Value::Decimal)
                    .ok_or_else(|| error("decimal out of range"))
            }
            _ => Err(unsupported()),
        }
    }

    fn negate(value: &Value) -> Result<Value, SemanticError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| error("integer out of range")),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Decimal(d) => Ok(Value::Decimal(-*d)),
            other => Err(error(format!("cannot negate {}", type_name(other)))),
        }
    }

    fn call(func: ScalarFunction, args: Vec<Value>) -> Result<Value, SemanticError> {
        let mut args = args.into_iter();
        let first = args.next();

        match func {
            ScalarFunction::Coalesce => {
                Ok(first.into_iter().chain(args).find(|v| !v.is_null()).unwrap_or(Value::Null))
            }
            ScalarFunction::Now => Ok(Value::Timestamp(chrono::Utc::now().naive_utc())),
            ScalarFunction::GenerateUuid => Ok(Value::Uuid(uuid::Uuid::new_v4())),
            _ => {
                let value = first.unwrap_or(Value::Null);
                if value.is_null() {
                    return Ok(Value::Null);
                }
                match (func, &value) {
                    (ScalarFunction::Upper, Value::Text(s)) => Ok(Value::Text(s.to_uppercase())),
                    (ScalarFunction::Lower, Value::Text(s)) => Ok(Value::Text(s.to_lowercase())),
                    (ScalarFunction::Length, Value::Text(s)) => {
                        Ok(Value::Integer(i64::try_from(s.chars().count()).unwrap_or(i64::MAX)))
                    }
                    (ScalarFunction::Length, Value::Bytea(b)) => {
                        Ok(Value::Integer(i64::try_from(b.len()).unwrap_or(i64::MAX)))
                    }
                    (ScalarFunction::Abs, Value::Integer(i)) => i
                        .checked_abs()
                        .map(Value::Integer)
                        .ok_or_else(|| error("integer out of range")),
                    (ScalarFunction::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
                    (ScalarFunction::Abs, Value::Decimal(d)) => Ok(Value::Decimal(d.abs())),
                    (ScalarFunction::Round, _) => {
                        let places = match args.next() {
                            None => 0,
                            Some(Value::Integer(p)) => p,
                            Some(Value::Null) => return Ok(Value::Null),
                            Some(other) => {
                                return Err(error(format!(
                                    "ROUND precision must be INTEGER, got {}",
                                    type_name(&other)
                                )));
                            }
                        };
                        round(&value, places)
                    }
                    _ => Err(error(format!(
                        "function {func:?} is not defined for {}",
                        type_name(&value)
                    ))),
                }
            }
        }
    }
}

fn round(value: &Value, places: i64) -> Result<Value, SemanticError> {
    let places = i32::try_from(places.clamp(-18, 18)).unwrap_or(0);
    match value {
        Value::Integer(i) if places >= 0 => Ok(Value::Integer(*i)),
        Value::Integer(i) => {
            let factor = 10_i64.pow(places.unsigned_abs());
            let rounded = i.saturating_add(i.signum() * factor / 2) / factor * factor;
            Ok(Value::Integer(rounded))
        }
        Value::Float(f) => {
            let factor = 10_f64.powi(places);
            Ok(Value::Float((f * factor).round() / factor))
        }
        Value::Decimal(d) if places >= 0 => Ok(Value::Decimal(d.round_dp(places.unsigned_abs()))),
        Value::Decimal(d) => {
            let factor = Decimal::from(10_i64.pow(places.unsigned_abs()));
            d.checked_div(factor)
                .and_then(|q| q.round().checked_mul(factor))
                .map(Value::Decimal)
                .ok_or_else(|| error("decimal out of range"))
        }
        other => Err(error(format!("ROUND is not defined for {}", type_name(other)))),
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        Value::Float(f) => Decimal::from_f64(*f),
        _ => None,
    }
}

/// Average of a sum over `count` rows, used by AVG
pub fn divide_by_count(sum: &Value, count: i64) -> Result<Value, SemanticError> {
    match sum {
        Value::Null => Ok(Value::Null),
        Value::Decimal(d) => d
            .checked_div(Decimal::from(count))
            .map(Value::Decimal)
            .ok_or_else(|| error("decimal out of range")),
        other => {
            let total = other
                .as_f64()
                .ok_or_else(|| error(format!("AVG is not defined for {}", type_name(other))))?;
            Ok(Value::Float(total / count.to_f64().unwrap_or(f64::NAN)))
        }
    }
}

const fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Concat => "||",
        _ => "?",
    }
}

const fn and3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

const fn or3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn negate3(value: Option<bool>, negated: bool) -> Value {
    value.map_or(Value::Null, |b| Value::Boolean(b != negated))
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one
#[must_use]
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Last `%` seen and the text position it currently extends to
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, until)) => {
                    resume = Some((star, until + 1));
                    p = star + 1;
                    t = until + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
