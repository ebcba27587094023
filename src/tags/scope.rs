//! Tags that bind variables or change how their body is rendered

use crate::engine::ast::FilterCall;
use crate::engine::{
    DocParser, Error, ExecutionContext, Expr, Function, MacroDef, Node, ParamKind, Parser, Statement,
    Token, TokenKind, Value,
};
use std::fmt;
use std::sync::Arc;

/// `name=expr` pairs as used by `with` and `include ... with`
pub(super) fn parse_assignments(args: &mut Parser<'_>) -> Result<Vec<(String, Expr)>, Error> {
    let mut pairs = Vec::new();
    while args.current().map_or(false, |t| t.kind == TokenKind::Identifier)
        && args.peek(1).map_or(false, |t| t.is_symbol("="))
    {
        let name = args.expect_identifier()?.val.clone();
        args.expect_symbol("=")?;
        pairs.push((name, args.parse_expression()?));
    }
    Ok(pairs)
}

pub(super) fn evaluate_assignments(
    ctx: &mut ExecutionContext<'_>,
    pairs: &[(String, Expr)],
) -> Result<Vec<(String, Value)>, Error> {
    pairs
        .iter()
        .map(|(name, expr)| Ok((name.clone(), expr.evaluate(ctx)?)))
        .collect()
}

#[derive(Debug)]
struct WithStatement {
    vars: Vec<(String, Expr)>,
    body: Vec<Node>,
}

impl Statement for WithStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let vars = evaluate_assignments(ctx, &self.vars)?;
        ctx.scoped(vars, |ctx| ctx.execute_nodes(&self.body, out))
    }
}

/// `{% with total=a+b label="x" %}` or `{% with a+b as total %}`
pub(super) fn parse_with(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let mut vars = parse_assignments(args)?;
    if vars.is_empty() {
        let expr = args.parse_expression()?;
        args.expect_keyword("as")?;
        let name = args.expect_identifier()?.val.clone();
        vars.push((name, expr));
    }

    let wrapped = doc.wrap_until(&["endwith"], start)?;
    wrapped.args.expect_done("endwith")?;
    Ok(Box::new(WithStatement {
        vars,
        body: wrapped.nodes,
    }))
}

#[derive(Debug)]
struct SetStatement {
    name: String,
    expr: Expr,
}

impl Statement for SetStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, _out: &mut dyn fmt::Write) -> Result<(), Error> {
        let value = self.expr.evaluate(ctx)?;
        ctx.set_var(&self.name, value);
        Ok(())
    }
}

/// `{% set name = expr %}` binds in the innermost scope
pub(super) fn parse_set(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let name = args.expect_identifier()?.val.clone();
    args.expect_symbol("=")?;
    let expr = args.parse_expression()?;
    Ok(Box::new(SetStatement { name, expr }))
}

/// A callable value invoking the macro
pub(super) fn macro_function(def: &Arc<MacroDef>) -> Function {
    let target = Arc::clone(def);
    let mut function = Function::with_context(&def.name, move |ctx, args| ctx.call_macro(&target, args));
    for (_, default) in &def.params {
        function = match default {
            Some(_) => function.optional(ParamKind::Any),
            None => function.param(ParamKind::Any),
        };
    }
    function
}

#[derive(Debug)]
struct MacroStatement {
    def: Arc<MacroDef>,
}

impl Statement for MacroStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, _out: &mut dyn fmt::Write) -> Result<(), Error> {
        ctx.set_var(&self.def.name, Value::Func(macro_function(&self.def)));
        Ok(())
    }
}

/// `{% macro name(a, b="default") [export] %}...{% endmacro %}`
pub(super) fn parse_macro(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let name = args.expect_identifier()?.val.clone();
    args.expect_symbol("(")?;

    let mut params: Vec<(String, Option<Expr>)> = Vec::new();
    if args.match_symbol(")").is_none() {
        loop {
            let param = args.expect_identifier()?;
            if params.iter().any(|(existing, _)| *existing == param.val) {
                return Err(Error::parse(
                    param.position(),
                    format!("duplicate parameter '{}' in macro '{}'", param.val, name),
                ));
            }
            let default = match args.match_symbol("=") {
                Some(_) => Some(args.parse_expression()?),
                None => None,
            };
            if default.is_none() && params.iter().any(|(_, d)| d.is_some()) {
                return Err(Error::parse(
                    param.position(),
                    format!("parameter '{}' without a default follows one with a default", param.val),
                ));
            }
            params.push((param.val.clone(), default));
            if args.match_symbol(")").is_some() {
                break;
            }
            args.expect_symbol(",")?;
        }
    }
    let exported = args.match_keyword("export").is_some();

    let wrapped = doc.wrap_until(&["endmacro"], start)?;
    wrapped.args.expect_done("endmacro")?;

    let def = Arc::new(MacroDef {
        name,
        params,
        body: wrapped.nodes,
        exported,
    });
    if exported {
        doc.export_macro(Arc::clone(&def), start)?;
    }
    Ok(Box::new(MacroStatement { def }))
}

#[derive(Debug)]
struct AutoescapeStatement {
    enabled: bool,
    body: Vec<Node>,
}

impl Statement for AutoescapeStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        ctx.with_autoescape(self.enabled, |ctx| ctx.execute_nodes(&self.body, out))
    }
}

/// `{% autoescape on|off %}...{% endautoescape %}`
pub(super) fn parse_autoescape(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let mode = args.expect_identifier()?;
    let enabled = match mode.val.as_str() {
        "on" => true,
        "off" => false,
        other => {
            return Err(Error::parse(
                mode.position(),
                format!("autoescape expects 'on' or 'off', got '{}'", other),
            ))
        }
    };

    let wrapped = doc.wrap_until(&["endautoescape"], start)?;
    wrapped.args.expect_done("endautoescape")?;
    Ok(Box::new(AutoescapeStatement {
        enabled,
        body: wrapped.nodes,
    }))
}

#[derive(Debug)]
struct FilterStatement {
    filters: Vec<FilterCall>,
    body: Vec<Node>,
}

impl Statement for FilterStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        // the body is already escaped
        let mut value = Value::safe(ctx.render_to_string(&self.body)?);
        for filter in &self.filters {
            value = filter.apply(ctx, value)?;
        }
        ctx.write_value(out, &value)
    }
}

/// `{% filter lower|truncatechars:10 %}...{% endfilter %}`
pub(super) fn parse_filter(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let filters = args.parse_filter_chain()?;
    let wrapped = doc.wrap_until(&["endfilter"], start)?;
    wrapped.args.expect_done("endfilter")?;
    Ok(Box::new(FilterStatement {
        filters,
        body: wrapped.nodes,
    }))
}
