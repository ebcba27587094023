//! Sequence filters

use super::{count_arg, required};
use crate::engine::{Error, Value};

pub(super) fn length(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::from(input.len().unwrap_or(0)))
}

pub(super) fn length_is(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let expected = count_arg(arg)?;
    Ok(Value::Bool(input.len().unwrap_or(0) == expected))
}

pub(super) fn first(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(match input {
        Value::Seq(items) => items.first().cloned().unwrap_or_default(),
        Value::Str(s) | Value::Safe(s) => s
            .chars()
            .next()
            .map(|c| Value::from(c.to_string()))
            .unwrap_or_default(),
        _ => Value::Nil,
    })
}

pub(super) fn last(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(match input {
        Value::Seq(items) => items.last().cloned().unwrap_or_default(),
        Value::Str(s) | Value::Safe(s) => s
            .chars()
            .last()
            .map(|c| Value::from(c.to_string()))
            .unwrap_or_default(),
        _ => Value::Nil,
    })
}

/// Join a sequence with the argument; the result is safe only if every item was
pub(super) fn join(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let Value::Seq(items) = input else {
        return Ok(input.clone());
    };
    let separator = arg.map(|a| a.to_string()).unwrap_or_default();
    let joined = items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(&separator);
    if items.iter().all(Value::is_safe) && arg.map_or(true, Value::is_safe) {
        Ok(Value::safe(joined))
    } else {
        Ok(Value::from(joined))
    }
}

/// Bounds of a `from:to` slice over `len` items, clamped like Python slices
fn slice_bounds(range: &str, len: usize) -> Result<(usize, usize), Error> {
    let (from, to) = range
        .split_once(':')
        .ok_or_else(|| Error::execution(format!("slice expects 'from:to', got '{}'", range)))?;
    let bound = |part: &str, default: usize| -> Result<usize, Error> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(default);
        }
        let n: i64 = part
            .parse()
            .map_err(|_| Error::execution(format!("invalid slice bound '{}'", part)))?;
        let len = len as i64;
        let idx = if n < 0 { (len + n).max(0) } else { n.min(len) };
        Ok(idx as usize)
    };
    let start = bound(from, 0)?;
    let end = bound(to, len)?;
    Ok((start, end.max(start)))
}

pub(super) fn slice(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let range = required(arg)?.to_string();
    match input {
        Value::Seq(items) => {
            let (start, end) = slice_bounds(&range, items.len())?;
            Ok(Value::from(items[start..end].to_vec()))
        }
        Value::Str(s) | Value::Safe(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(&range, chars.len())?;
            let sliced: String = chars[start..end].iter().collect();
            Ok(super::like_input(input, sliced))
        }
        other => Err(Error::execution(format!("cannot slice {}", other.type_name()))),
    }
}

pub(super) fn make_list(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    match input {
        Value::Seq(_) => Ok(input.clone()),
        other => {
            let chars: Vec<Value> = other
                .to_string()
                .chars()
                .map(|c| Value::from(c.to_string()))
                .collect();
            Ok(Value::from(chars))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq() -> Value {
        Value::from(vec![1, 2, 3, 4, 5])
    }

    #[test]
    fn test_length() {
        assert_eq!(length(&seq(), None).unwrap().to_string(), "5");
        assert_eq!(length(&Value::from("héllo"), None).unwrap().to_string(), "5");
        assert_eq!(length(&Value::Nil, None).unwrap().to_string(), "0");
        assert!(length_is(&seq(), Some(&Value::from(5))).unwrap().is_truthy());
    }

    #[test]
    fn test_first_last() {
        assert_eq!(first(&seq(), None).unwrap().to_string(), "1");
        assert_eq!(last(&Value::from("abc"), None).unwrap().to_string(), "c");
        assert!(first(&Value::from(Vec::<Value>::new()), None).unwrap().is_nil());
    }

    #[test]
    fn test_join() {
        assert_eq!(join(&seq(), Some(&Value::from("-"))).unwrap().to_string(), "1-2-3-4-5");
        let safe = Value::from(vec![Value::safe("<a>"), Value::safe("<b>")]);
        assert!(join(&safe, Some(&Value::safe(""))).unwrap().is_safe());
        let mixed = Value::from(vec![Value::safe("<a>"), Value::from("<b>")]);
        assert!(!join(&mixed, None).unwrap().is_safe());
    }

    #[test]
    fn test_slice() {
        let s = |v: &Value, range: &str| slice(v, Some(&Value::from(range))).unwrap().to_string();
        assert_eq!(s(&seq(), "1:3"), "[2, 3]");
        assert_eq!(s(&seq(), ":2"), "[1, 2]");
        assert_eq!(s(&seq(), "-2:"), "[4, 5]");
        assert_eq!(s(&seq(), "4:1"), "[]");
        assert_eq!(s(&Value::from("abcdef"), "2:100"), "cdef");
        assert!(slice(&seq(), Some(&Value::from("x:1"))).is_err());
        assert!(slice(&seq(), Some(&Value::from("3"))).is_err());
    }

    #[test]
    fn test_make_list() {
        assert_eq!(make_list(&Value::from("ab"), None).unwrap().to_string(), "[a, b]");
        assert_eq!(make_list(&Value::from(123), None).unwrap().to_string(), "[1, 2, 3]");
    }
}
