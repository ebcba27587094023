//! Filters choosing between values

use super::required;
use crate::engine::{Error, Value};

/// The argument when the input is falsy
pub(super) fn default(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let fallback = required(arg)?;
    Ok(if input.is_truthy() {
        input.clone()
    } else {
        fallback.clone()
    })
}

/// The argument only when the input is nil
pub(super) fn default_if_none(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let fallback = required(arg)?;
    Ok(if input.is_nil() {
        fallback.clone()
    } else {
        input.clone()
    })
}

/// `yesno:"yes,no,maybe"` maps true, false and nil to words
pub(super) fn yesno(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let options = arg.map(|a| a.to_string()).unwrap_or_else(|| "yes,no,maybe".to_string());
    let choices: Vec<&str> = options.split(',').collect();
    let (yes, no, maybe) = match choices.as_slice() {
        [yes, no] => (*yes, *no, *no),
        [yes, no, maybe] => (*yes, *no, *maybe),
        _ => {
            return Err(Error::execution(format!(
                "expected two or three comma separated choices, got '{}'",
                options
            )))
        }
    };
    Ok(Value::from(if input.is_nil() {
        maybe
    } else if input.is_truthy() {
        yes
    } else {
        no
    }))
}

/// `pluralize`, `pluralize:"es"` or `pluralize:"y,ies"`
pub(super) fn pluralize(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let options = arg.map(|a| a.to_string()).unwrap_or_else(|| "s".to_string());
    let (singular, plural) = match options.split_once(',') {
        Some((singular, plural)) if !plural.contains(',') => (singular.to_string(), plural.to_string()),
        Some(_) => return Err(Error::execution(format!("too many suffixes in '{}'", options))),
        None => (String::new(), options),
    };
    let count = match input {
        Value::Seq(_) | Value::Map(_) => input.len().unwrap_or(0) as i64,
        other => other.to_integer(),
    };
    Ok(Value::from(if count == 1 { singular } else { plural }))
}
