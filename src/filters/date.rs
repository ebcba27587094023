//! Date formatting

use crate::engine::{Error, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::fmt::{self, Write as _};

/// strftime format used when `date` gets no argument
const DEFAULT_FORMAT: &str = "%Y-%m-%d";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

enum Parsed {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

fn parse_datetime(s: &str) -> Option<Parsed> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Parsed::Zoned(dt));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Parsed::Naive(dt));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(Parsed::Naive)
}

/// Write a chrono formatter into a string, turning a bad format into an error
pub fn format_datetime<D: fmt::Display>(formatted: D) -> Result<String, Error> {
    let mut out = String::new();
    write!(out, "{}", formatted).map_err(|_| Error::execution("invalid date format"))?;
    Ok(out)
}

/// `date:"%d %b %Y"` over timestamps and date strings
pub(super) fn date(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let format = arg
        .map(|a| a.to_string())
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
    let parsed = match input {
        Value::Nil => return Ok(Value::from("")),
        Value::Int(ts) => DateTime::from_timestamp(*ts, 0)
            .map(|dt| Parsed::Zoned(dt.fixed_offset()))
            .ok_or_else(|| Error::execution(format!("timestamp {} is out of range", ts)))?,
        Value::Str(s) | Value::Safe(s) => parse_datetime(s)
            .ok_or_else(|| Error::execution(format!("cannot parse '{}' as a date", s)))?,
        other => {
            return Err(Error::execution(format!(
                "expected a date string or timestamp, got {}",
                other.type_name()
            )))
        }
    };
    let formatted = match parsed {
        Parsed::Zoned(dt) => format_datetime(dt.format(&format))?,
        Parsed::Naive(dt) => format_datetime(dt.format(&format))?,
    };
    Ok(Value::from(formatted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: Value, format: Option<&str>) -> Result<String, Error> {
        let format = format.map(Value::from);
        date(&input, format.as_ref()).map(|v| v.to_string())
    }

    #[test]
    fn test_date_strings() {
        assert_eq!(run(Value::from("2024-03-05"), None).unwrap(), "2024-03-05");
        assert_eq!(
            run(Value::from("2024-03-05 14:30:00"), Some("%d/%m/%Y %H:%M")).unwrap(),
            "05/03/2024 14:30"
        );
        assert_eq!(
            run(Value::from("2024-03-05T14:30:00+02:00"), Some("%H:%M %z")).unwrap(),
            "14:30 +0200"
        );
    }

    #[test]
    fn test_date_timestamp() {
        assert_eq!(run(Value::from(0), Some("%Y")).unwrap(), "1970");
    }

    #[test]
    fn test_date_errors() {
        assert!(run(Value::from("yesterday"), None).is_err());
        assert!(run(Value::from(vec![1]), None).is_err());
        assert!(run(Value::from("2024-03-05"), Some("%Q")).is_err());
        assert_eq!(run(Value::Nil, None).unwrap(), "");
    }
}
