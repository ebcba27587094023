//! Tags producing or reshaping literal text

use crate::engine::{DocParser, Error, ExecutionContext, Expr, Node, Parser, Statement, Token, Value};
use crate::filters::format_datetime;
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref BETWEEN_TAGS_RE: Regex = Regex::new(r">\s+<").unwrap();
}

#[derive(Debug)]
struct SpacelessStatement {
    body: Vec<Node>,
}

impl Statement for SpacelessStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let rendered = ctx.render_to_string(&self.body)?;
        let collapsed = BETWEEN_TAGS_RE.replace_all(&rendered, "><");
        out.write_str(collapsed.trim())?;
        Ok(())
    }
}

/// `{% spaceless %}` removes whitespace between HTML tags
pub(super) fn parse_spaceless(doc: &mut DocParser<'_>, start: &Token, _args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let wrapped = doc.wrap_until(&["endspaceless"], start)?;
    wrapped.args.expect_done("endspaceless")?;
    Ok(Box::new(SpacelessStatement { body: wrapped.nodes }))
}

#[derive(Debug)]
struct CommentStatement;

impl Statement for CommentStatement {
    fn execute(&self, _ctx: &mut ExecutionContext<'_>, _out: &mut dyn fmt::Write) -> Result<(), Error> {
        Ok(())
    }
}

pub(super) fn parse_comment(doc: &mut DocParser<'_>, start: &Token, _args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let wrapped = doc.wrap_until(&["endcomment"], start)?;
    wrapped.args.expect_done("endcomment")?;
    Ok(Box::new(CommentStatement))
}

#[derive(Debug)]
struct NowStatement {
    format: String,
    fake: bool,
}

impl Statement for NowStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let formatted = if self.fake {
            let fixed = NaiveDate::from_ymd_opt(2008, 1, 2)
                .and_then(|d| d.and_hms_opt(15, 4, 5))
                .ok_or_else(|| Error::execution("invalid fixed date"))?;
            format_datetime(fixed.format(&self.format))?
        } else {
            format_datetime(Local::now().format(&self.format))?
        };
        ctx.write_value(out, &Value::from(formatted))
    }
}

/// `{% now "%Y-%m-%d" [fake] %}`; `fake` pins the time for reproducible output
pub(super) fn parse_now(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let token = args.expect_string()?;
    if StrftimeItems::new(&token.val).any(|item| matches!(item, Item::Error)) {
        return Err(Error::parse(
            token.position(),
            format!("invalid date format '{}'", token.val),
        ));
    }
    let fake = args.match_identifier("fake").is_some();
    Ok(Box::new(NowStatement {
        format: token.val.clone(),
        fake,
    }))
}

#[derive(Debug)]
struct TextStatement {
    text: &'static str,
}

impl Statement for TextStatement {
    fn execute(&self, _ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        out.write_str(self.text)?;
        Ok(())
    }
}

/// `{% templatetag openblock %}` outputs one of the syntax characters
pub(super) fn parse_templatetag(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let token = args.expect_identifier()?;
    let text = match token.val.as_str() {
        "openblock" => "{%",
        "closeblock" => "%}",
        "openvariable" => "{{",
        "closevariable" => "}}",
        "openbrace" => "{",
        "closebrace" => "}",
        "opencomment" => "{#",
        "closecomment" => "#}",
        other => {
            return Err(Error::parse(
                token.position(),
                format!("unknown templatetag '{}'", other),
            ))
        }
    };
    Ok(Box::new(TextStatement { text }))
}

#[derive(Debug)]
struct WidthRatioStatement {
    value: Expr,
    max_value: Expr,
    max_width: Expr,
    alias: Option<String>,
}

impl WidthRatioStatement {
    fn number(expr: &Expr, ctx: &mut ExecutionContext<'_>, what: &str) -> Result<f64, Error> {
        let value = expr.evaluate(ctx)?;
        value.to_float().ok_or_else(|| {
            Error::execution(format!("widthratio {} must be a number, got {}", what, value.type_name()))
        })
    }
}

impl Statement for WidthRatioStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let value = Self::number(&self.value, ctx, "value")?;
        let max_value = Self::number(&self.max_value, ctx, "maximum")?;
        let max_width = Self::number(&self.max_width, ctx, "width")?;
        let ratio = if max_value == 0.0 {
            0
        } else {
            (value / max_value * max_width).round() as i64
        };
        match &self.alias {
            Some(alias) => ctx.set_var(alias, Value::Int(ratio)),
            None => write!(out, "{}", ratio)?,
        }
        Ok(())
    }
}

/// `{% widthratio value max_value max_width [as name] %}`
pub(super) fn parse_widthratio(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let value = args.parse_expression()?;
    let max_value = args.parse_expression()?;
    let max_width = args.parse_expression()?;
    let alias = match args.match_keyword("as") {
        Some(_) => Some(args.expect_identifier()?.val.clone()),
        None => None,
    };
    Ok(Box::new(WidthRatioStatement {
        value,
        max_value,
        max_width,
        alias,
    }))
}

#[cfg(test)]
mod tests {
    use crate::engine::{Context, TemplateSet};

    fn render(src: &str) -> String {
        let set = TemplateSet::new("text", Vec::new());
        let mut ctx = Context::new();
        ctx.insert("v", 175);
        ctx.insert("max", 200);
        set.from_string(src).unwrap().execute(&ctx).unwrap()
    }

    #[test]
    fn test_spaceless() {
        assert_eq!(
            render("{% spaceless %}\n<p>\n  <a>x y</a>\n</p>\n{% endspaceless %}"),
            "<p><a>x y</a></p>"
        );
    }

    #[test]
    fn test_comment_tag() {
        assert_eq!(render("a{% comment %}hidden {{ v }}{% endcomment %}b"), "ab");
    }

    #[test]
    fn test_now_fake() {
        assert_eq!(render("{% now \"%Y-%m-%d %H:%M:%S\" fake %}"), "2008-01-02 15:04:05");
        let set = TemplateSet::new("text", Vec::new());
        assert!(set.from_string("{% now \"%Q\" %}").is_err());
    }

    #[test]
    fn test_templatetag() {
        assert_eq!(render("{% templatetag openblock %} x {% templatetag closevariable %}"), "{% x }}");
        let set = TemplateSet::new("text", Vec::new());
        assert!(set.from_string("{% templatetag nope %}").is_err());
    }

    #[test]
    fn test_widthratio() {
        assert_eq!(render("{% widthratio v max 100 %}"), "88");
        assert_eq!(render("{% widthratio v 0 100 %}"), "0");
        assert_eq!(render("{% widthratio v max 10 as w %}[{{ w }}]"), "[9]");
    }
}
