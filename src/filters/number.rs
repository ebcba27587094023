//! Numeric filters

use super::required;
use crate::engine::{Error, Value};

/// Numeric addition, falling back to sequence or string concatenation
pub(super) fn add(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let other = required(arg)?;
    match (input, other) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| Error::execution("integer overflow")),
        (Value::Seq(a), Value::Seq(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::from(items))
        }
        (a, b) if a.is_number() && b.is_number() => match (a.to_float(), b.to_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Ok(Value::Nil),
        },
        (a, b) => Ok(Value::from(format!("{}{}", a, b))),
    }
}

pub(super) fn integer(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::Int(input.to_integer()))
}

pub(super) fn float(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::Float(input.to_float().unwrap_or(0.0)))
}

/// Round to the argument's number of decimals (default 1)
///
/// A negative argument drops the decimals when the value is whole, so
/// `34.0|floatformat:-2` gives `34` while `34.567|floatformat:-2` gives `34.57`.
pub(super) fn floatformat(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let Some(value) = input.to_float() else {
        return Ok(Value::from(""));
    };
    let places = arg.map(Value::to_integer).unwrap_or(-1);
    let precision = places.unsigned_abs().min(20) as usize;
    if places < 0 && value.fract() == 0.0 {
        return Ok(Value::from(format!("{:.0}", value)));
    }
    Ok(Value::from(format!("{:.*}", precision, value)))
}

pub(super) fn divisibleby(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let divisor = required(arg)?.to_integer();
    if divisor == 0 {
        return Err(Error::execution("division by zero"));
    }
    Ok(Value::Bool(input.to_integer() % divisor == 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        let run = |a: Value, b: Value| add(&a, Some(&b)).unwrap().to_string();
        assert_eq!(run(Value::from(1), Value::from(2)), "3");
        assert_eq!(run(Value::from(1.5), Value::from(2)), "3.5");
        assert_eq!(run(Value::from("a"), Value::from(2)), "a2");
        assert_eq!(run(Value::from(vec![1]), Value::from(vec![2])), "[1, 2]");
        assert!(add(&Value::Int(i64::MAX), Some(&Value::Int(1))).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(integer(&Value::from("42"), None).unwrap().to_string(), "42");
        assert_eq!(integer(&Value::from("x"), None).unwrap().to_string(), "0");
        assert!(matches!(float(&Value::from("2.5"), None).unwrap(), Value::Float(f) if f == 2.5));
    }

    #[test]
    fn test_floatformat() {
        let run = |v: f64, arg: Option<i64>| {
            let arg = arg.map(Value::Int);
            floatformat(&Value::Float(v), arg.as_ref()).unwrap().to_string()
        };
        assert_eq!(run(34.23234, None), "34.2");
        assert_eq!(run(34.0, None), "34");
        assert_eq!(run(34.23234, Some(3)), "34.232");
        assert_eq!(run(34.0, Some(2)), "34.00");
        assert_eq!(run(34.0, Some(-2)), "34");
        assert_eq!(run(34.567, Some(-2)), "34.57");
        assert_eq!(floatformat(&Value::from("abc"), None).unwrap().to_string(), "");
    }

    #[test]
    fn test_divisibleby() {
        assert!(divisibleby(&Value::from(21), Some(&Value::from(7))).unwrap().is_truthy());
        assert!(!divisibleby(&Value::from(20), Some(&Value::from(7))).unwrap().is_truthy());
        assert!(divisibleby(&Value::from(1), Some(&Value::from(0))).is_err());
    }
}
