//! HTML filters

use super::required;
use crate::engine::{Error, Value};
use lazy_static::lazy_static;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

/// Upper bound on `striptags`/`removetags` passes before giving up
pub const MAX_TAG_STRIP_PASSES: usize = 100;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^<>]*>").unwrap();
    static ref TAG_NAME_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").unwrap();
    static ref PARAGRAPH_BREAK_RE: Regex = Regex::new(r"\n{2,}").unwrap();
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Escape a value unless it is already marked safe
fn escaped_text(input: &Value) -> String {
    if input.is_safe() {
        input.to_string()
    } else {
        html_escape(&input.to_string())
    }
}

/// Remove matches of `re` until nothing changes
fn strip_to_fixed_point(s: &str, re: &Regex) -> Result<String, Error> {
    let mut current = s.to_string();
    for _ in 0..MAX_TAG_STRIP_PASSES {
        let next = re.replace_all(&current, "").into_owned();
        if next == current {
            return Ok(current);
        }
        current = next;
    }
    Err(Error::execution(format!(
        "tag stripping did not converge after {} passes",
        MAX_TAG_STRIP_PASSES
    )))
}

pub(super) fn safe(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(input.clone().into_safe())
}

pub(super) fn escape(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    Ok(Value::safe(escaped_text(input)))
}

pub(super) fn striptags(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let stripped = strip_to_fixed_point(&input.to_string(), &TAG_RE)?;
    Ok(Value::from(stripped.trim().to_string()))
}

/// `removetags:"b,span"`
pub(super) fn removetags(input: &Value, arg: Option<&Value>) -> Result<Value, Error> {
    let names: Vec<String> = required(arg)?
        .to_string()
        .split(',')
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(input.clone());
    }
    if let Some(bad) = names.iter().find(|n| !TAG_NAME_RE.is_match(n)) {
        return Err(Error::execution(format!("invalid tag name '{}'", bad)));
    }
    let re = Regex::new(&format!(r"(?i)</?(?:{})\b[^>]*>", names.join("|")))
        .map_err(|e| Error::execution(format!("invalid tag list: {}", e)))?;
    let stripped = strip_to_fixed_point(&input.to_string(), &re)?;
    Ok(if input.is_safe() {
        Value::safe(stripped)
    } else {
        Value::from(stripped)
    })
}

pub(super) fn linebreaksbr(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let text = escaped_text(input).replace("\r\n", "\n");
    Ok(Value::safe(text.replace('\n', "<br />")))
}

pub(super) fn linebreaks(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let text = escaped_text(input).replace("\r\n", "\n");
    let paragraphs: Vec<String> = PARAGRAPH_BREAK_RE
        .split(text.trim())
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", p.replace('\n', "<br />")))
        .collect();
    Ok(Value::safe(paragraphs.join("\n\n")))
}

pub(super) fn escapejs(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let mut out = String::new();
    for c in input.to_string().chars() {
        match c {
            '\\' | '\'' | '"' | '<' | '>' | '&' | '=' | '-' | ';' | '`' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    Ok(Value::from(out))
}

pub(super) fn markdown(input: &Value, _: Option<&Value>) -> Result<Value, Error> {
    let source = input.to_string();
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(&source, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    Ok(Value::safe(out))
}
