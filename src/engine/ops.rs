//! Operator semantics for expressions

use super::ast::{BinaryOp, UnaryOp};
use super::error::Error;
use super::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => f as i64,
        }
    }
}

fn operands(op: &str, lhs: &Value, rhs: &Value) -> Result<(Number, Number), Error> {
    match (Number::of(lhs), Number::of(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::execution(format!(
            "unsupported operand types for '{}': {} and {}",
            op,
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn overflow(op: &str) -> Error {
    Error::execution(format!("integer overflow in '{}'", op))
}

fn arithmetic(
    op: &str,
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    match operands(op, lhs, rhs)? {
        (Number::Int(a), Number::Int(b)) => int_op(a, b).map(Value::Int).ok_or_else(|| overflow(op)),
        (a, b) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

pub fn unary(op: UnaryOp, value: Value) -> Result<Value, Error> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Plus, value @ (Value::Int(_) | Value::Float(_))) => Ok(value),
        (UnaryOp::Minus, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow("-")),
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, value) => Err(Error::execution(format!(
            "unary '{}' is not supported on {}",
            if op == UnaryOp::Plus { "+" } else { "-" },
            value.type_name()
        ))),
    }
}

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.equals(rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.equals(rhs))),
        BinaryOp::Lt => compare(lhs, rhs, "<").map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => compare(lhs, rhs, "<=").map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => compare(lhs, rhs, ">").map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => compare(lhs, rhs, ">=").map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::In => rhs.contains(lhs).map(Value::Bool),
        BinaryOp::NotIn => rhs.contains(lhs).map(|found| Value::Bool(!found)),
        BinaryOp::Add => {
            if lhs.is_number() && rhs.is_number() {
                arithmetic("+", lhs, rhs, i64::checked_add, |a, b| a + b)
            } else {
                Ok(Value::from(format!("{}{}", lhs, rhs)))
            }
        }
        BinaryOp::Sub => arithmetic("-", lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic("*", lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => divide(lhs, rhs),
        BinaryOp::Mod => {
            let (a, b) = operands("%", lhs, rhs)?;
            let (a, b) = (a.as_i64(), b.as_i64());
            if b == 0 {
                return Err(Error::execution("modulo by zero"));
            }
            a.checked_rem(b).map(Value::Int).ok_or_else(|| overflow("%"))
        }
        BinaryOp::Pow => {
            let (a, b) = operands("^", lhs, rhs)?;
            Ok(Value::Float(a.as_f64().powf(b.as_f64())))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => lhs.is_truthy() && rhs.is_truthy(),
            _ => lhs.is_truthy() || rhs.is_truthy(),
        })),
    }
}

fn divide(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match operands("/", lhs, rhs)? {
        (_, Number::Int(0)) => Err(Error::execution("division by zero")),
        (_, Number::Float(b)) if b == 0.0 => Err(Error::execution("division by zero")),
        (Number::Int(a), Number::Int(b)) => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow("/")),
        (a, b) => Ok(Value::Float(a.as_f64() / b.as_f64())),
    }
}

fn compare(lhs: &Value, rhs: &Value, op: &str) -> Result<Ordering, Error> {
    lhs.compare(rhs).ok_or_else(|| {
        Error::execution(format!(
            "cannot compare {} and {} with '{}'",
            lhs.type_name(),
            rhs.type_name(),
            op
        ))
    })
}
