//! String filters

use super::{count_arg, like_input, required};
use crate::engine::{Error, Value};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone by `urlencode`
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

pub(super) fn upper(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(like_input(input, input.to_string().to_uppercase()))
}

pub(super) fn lower(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(like_input(input, input.to_string().to_lowercase()))
}

pub(super) fn title(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let mut out = String::new();
    let mut in_word = false;
    for c in input.to_string().chars() {
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        in_word = c.is_alphanumeric() || c == '\'';
    }
    Ok(like_input(input, out))
}

pub(super) fn capfirst(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let s = input.to_string();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(like_input(input, out))
}

/// `cut:" "` removes every occurrence of the argument
pub(super) fn cut(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let needle = required(arg)?.to_string();
    Ok(like_input(input, input.to_string().replace(&needle, "")))
}

/// Shorten to at most `length` characters, ending in "..."
fn truncate(s: &str, length: usize) -> String {
    const OMISSION: &str = "...";
    if s.chars().count() <= length {
        return s.to_string();
    }
    let kept: String = s.chars().take(length.saturating_sub(OMISSION.len())).collect();
    format!("{}{}", kept.trim_end(), OMISSION)
}

pub(super) fn truncatechars(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let length = count_arg(arg)?;
    Ok(like_input(input, truncate(&input.to_string(), length)))
}

pub(super) fn truncatewords(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let count = count_arg(arg)?;
    let s = input.to_string();
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= count {
        return Ok(like_input(input, words.join(" ")));
    }
    Ok(like_input(input, format!("{} ...", words[..count].join(" "))))
}

pub(super) fn wordcount(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::from(input.to_string().split_whitespace().count()))
}

/// Break lines so that none exceeds `width` characters, unless a single word does
pub(super) fn wordwrap(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let width = count_arg(arg)?;
    let mut result = String::new();
    let mut line_len = 0;

    for word in input.to_string().split_whitespace() {
        let word_len = word.chars().count();
        if line_len + word_len + 1 > width {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(word);
            line_len = word_len;
        } else {
            if !result.is_empty() {
                result.push(' ');
                line_len += 1;
            }
            result.push_str(word);
            line_len += word_len;
        }
    }

    Ok(like_input(input, result))
}

fn padding(input: &Value, arg: Option<&Value>) -> Result<(String, usize), Error> {
    let width = count_arg(arg)?;
    let s = input.to_string();
    let pad = width.saturating_sub(s.chars().count());
    Ok((s, pad))
}

pub(super) fn center(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let (s, pad) = padding(input, arg)?;
    let left = pad / 2;
    let right = pad - left;
    Ok(like_input(input, format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))))
}

pub(super) fn ljust(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let (s, pad) = padding(input, arg)?;
    Ok(like_input(input, format!("{}{}", s, " ".repeat(pad))))
}

pub(super) fn rjust(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let (s, pad) = padding(input, arg)?;
    Ok(like_input(input, format!("{}{}", " ".repeat(pad), s)))
}

pub(super) fn slugify(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::from(slug::slugify(input.to_string())))
}

pub(super) fn urlencode(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let s = input.to_string();
    Ok(Value::from(utf8_percent_encode(&s, URL_SAFE).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(f: fn(&Value, Option<&Value>) -> Result<Value, Error>, input: &str, arg: Option<Value>) -> String {
        f(&Value::from(input), arg.as_ref()).unwrap().to_string()
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(apply(upper, "abc", None), "ABC");
        assert_eq!(apply(lower, "ÄBC", None), "äbc");
        assert_eq!(apply(title, "hello wORLD, it's me", None), "Hello World, It's Me");
        assert_eq!(apply(capfirst, "élan vital", None), "Élan vital");
        assert_eq!(apply(capfirst, "", None), "");
    }

    #[test]
    fn test_case_filters_keep_safe_marking() {
        assert!(upper(&Value::safe("<b>"), None).unwrap().is_safe());
        assert!(!upper(&Value::from("<b>"), None).unwrap().is_safe());
    }

    #[test]
    fn test_truncation() {
        assert_eq!(apply(truncatechars, "Hello World", Some(Value::from(8))), "Hello...");
        assert_eq!(apply(truncatechars, "Short", Some(Value::from(10))), "Short");
        assert_eq!(apply(truncatewords, "one two three four", Some(Value::from(2))), "one two ...");
        assert_eq!(apply(truncatewords, "one two", Some(Value::from(5))), "one two");
    }

    #[test]
    fn test_words() {
        assert_eq!(apply(wordcount, "  a b\tc\n", None), "3");
        assert_eq!(
            apply(wordwrap, "the quick brown fox", Some(Value::from(10))),
            "the quick\nbrown fox"
        );
        assert_eq!(apply(cut, "a b c", Some(Value::from(" "))), "abc");
    }

    #[test]
    fn test_padding() {
        assert_eq!(apply(center, "ab", Some(Value::from(6))), "  ab  ");
        assert_eq!(apply(ljust, "ab", Some(Value::from(4))), "ab  ");
        assert_eq!(apply(rjust, "ab", Some(Value::from(4))), "  ab");
        assert_eq!(apply(rjust, "abcdef", Some(Value::from(4))), "abcdef");
        assert!(center(&Value::from("x"), None).is_err());
    }

    #[test]
    fn test_slugify_and_urlencode() {
        assert_eq!(apply(slugify, "Hello, World!", None), "hello-world");
        assert_eq!(apply(urlencode, "a b/c?d=é", None), "a%20b/c%3Fd%3D%C3%A9");
    }
}
