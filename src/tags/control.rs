//! Conditionals and loops

use crate::engine::{DocParser, Error, ExecutionContext, Expr, Node, Parser, Statement, Token, Value};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug)]
struct IfStatement {
    branches: Vec<(Expr, Vec<Node>)>,
    otherwise: Option<Vec<Node>>,
}

impl Statement for IfStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        for (condition, body) in &self.branches {
            if condition.evaluate(ctx)?.is_truthy() {
                return ctx.execute_nodes(body, out);
            }
        }
        match &self.otherwise {
            Some(body) => ctx.execute_nodes(body, out),
            None => Ok(()),
        }
    }
}

/// `{% if a %}...{% elif b %}...{% else %}...{% endif %}`
pub(super) fn parse_if(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let mut branches = Vec::new();
    let mut condition = args.parse_expression()?;
    let mut otherwise = None;

    loop {
        let wrapped = doc.wrap_until(&["elif", "else", "endif"], start)?;
        let mut end_args = wrapped.args;
        match wrapped.name.as_str() {
            "elif" => {
                let next = end_args.parse_expression()?;
                end_args.expect_done("elif")?;
                branches.push((std::mem::replace(&mut condition, next), wrapped.nodes));
            }
            "else" => {
                end_args.expect_done("else")?;
                branches.push((condition, wrapped.nodes));
                let rest = doc.wrap_until(&["endif"], start)?;
                rest.args.expect_done("endif")?;
                otherwise = Some(rest.nodes);
                break;
            }
            _ => {
                end_args.expect_done("endif")?;
                branches.push((condition, wrapped.nodes));
                break;
            }
        }
    }

    Ok(Box::new(IfStatement { branches, otherwise }))
}

#[derive(Debug)]
struct IfEqualStatement {
    lhs: Expr,
    rhs: Expr,
    negate: bool,
    body: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Statement for IfEqualStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let lhs = self.lhs.evaluate(ctx)?;
        let rhs = self.rhs.evaluate(ctx)?;
        if lhs.equals(&rhs) != self.negate {
            ctx.execute_nodes(&self.body, out)
        } else if let Some(otherwise) = &self.otherwise {
            ctx.execute_nodes(otherwise, out)
        } else {
            Ok(())
        }
    }
}

fn parse_if_equal(
    doc: &mut DocParser<'_>,
    start: &Token,
    args: &mut Parser<'_>,
    negate: bool,
) -> Result<Box<dyn Statement>, Error> {
    let end = if negate { "endifnotequal" } else { "endifequal" };
    let lhs = args.parse_expression()?;
    let rhs = args.parse_expression()?;

    let wrapped = doc.wrap_until(&["else", end], start)?;
    wrapped.args.expect_done(&wrapped.name)?;
    let otherwise = if wrapped.name == "else" {
        let rest = doc.wrap_until(&[end], start)?;
        rest.args.expect_done(end)?;
        Some(rest.nodes)
    } else {
        None
    };

    Ok(Box::new(IfEqualStatement {
        lhs,
        rhs,
        negate,
        body: wrapped.nodes,
        otherwise,
    }))
}

pub(super) fn parse_ifequal(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    parse_if_equal(doc, start, args, false)
}

pub(super) fn parse_ifnotequal(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    parse_if_equal(doc, start, args, true)
}

#[derive(Debug)]
struct ForStatement {
    key: String,
    value: Option<String>,
    iterable: Expr,
    reversed: bool,
    sorted: bool,
    body: Vec<Node>,
    empty: Option<Vec<Node>>,
}

impl ForStatement {
    /// `(first variable, second variable)` for each iteration
    fn entries(&self, iterable: &Value) -> Vec<(Value, Value)> {
        let mut entries: Vec<(Value, Value)> = match iterable {
            Value::Map(map) if self.value.is_some() => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| (Value::from(k.as_str()), map[k].clone()))
                    .collect()
            }
            other => {
                let mut items = other.iter_values().unwrap_or_default();
                if self.sorted {
                    items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
                }
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (Value::from(i), item))
                    .collect()
            }
        };
        if self.reversed {
            entries.reverse();
        }
        entries
    }
}

impl Statement for ForStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let iterable = self.iterable.evaluate(ctx)?;
        let entries = self.entries(&iterable);
        if entries.is_empty() {
            return match &self.empty {
                Some(body) => ctx.execute_nodes(body, out),
                None => Ok(()),
            };
        }

        let parent = ctx.lookup("forloop");
        let total = entries.len();
        for (i, (first, second)) in entries.into_iter().enumerate() {
            let mut forloop = IndexMap::new();
            forloop.insert("Counter".to_string(), Value::from(i + 1));
            forloop.insert("Counter0".to_string(), Value::from(i));
            forloop.insert("Revcounter".to_string(), Value::from(total - i));
            forloop.insert("Revcounter0".to_string(), Value::from(total - i - 1));
            forloop.insert("First".to_string(), Value::Bool(i == 0));
            forloop.insert("Last".to_string(), Value::Bool(i + 1 == total));
            forloop.insert("Parentloop".to_string(), parent.clone());

            let mut vars = vec![("forloop".to_string(), Value::from(forloop))];
            match &self.value {
                Some(name) => {
                    vars.push((self.key.clone(), first));
                    vars.push((name.clone(), second));
                }
                None => vars.push((self.key.clone(), second)),
            }
            ctx.scoped(vars, |ctx| ctx.execute_nodes(&self.body, out))?;
        }
        Ok(())
    }
}

/// `{% for item in items [reversed] [sorted] %}...{% empty %}...{% endfor %}`
pub(super) fn parse_for(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let key = args.expect_identifier()?.val.clone();
    let value = match args.match_symbol(",") {
        Some(_) => Some(args.expect_identifier()?.val.clone()),
        None => None,
    };
    args.expect_keyword("in")?;
    let iterable = args.parse_expression()?;

    let mut reversed = false;
    let mut sorted = false;
    loop {
        if args.match_identifier("reversed").is_some() {
            reversed = true;
        } else if args.match_identifier("sorted").is_some() {
            sorted = true;
        } else {
            break;
        }
    }

    let wrapped = doc.wrap_until(&["empty", "endfor"], start)?;
    wrapped.args.expect_done(&wrapped.name)?;
    let empty = if wrapped.name == "empty" {
        let rest = doc.wrap_until(&["endfor"], start)?;
        rest.args.expect_done("endfor")?;
        Some(rest.nodes)
    } else {
        None
    };

    Ok(Box::new(ForStatement {
        key,
        value,
        iterable,
        reversed,
        sorted,
        body: wrapped.nodes,
        empty,
    }))
}

#[derive(Debug)]
struct CycleStatement {
    values: Vec<Expr>,
    alias: Option<String>,
    silent: bool,
}

impl Statement for CycleStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let counter = match ctx.lookup("forloop") {
            Value::Map(forloop) => forloop.get("Counter0").and_then(Value::as_i64).unwrap_or(0),
            _ => 0,
        };
        let idx = counter.rem_euclid(self.values.len() as i64) as usize;
        let value = self.values[idx].evaluate(ctx)?;
        if let Some(alias) = &self.alias {
            ctx.set_var(alias, value.clone());
        }
        if !self.silent {
            ctx.write_value(out, &value)?;
        }
        Ok(())
    }
}

/// `{% cycle "odd" "even" [as name [silent]] %}`, advancing with the enclosing loop
pub(super) fn parse_cycle(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let mut values = Vec::new();
    let mut alias = None;
    let mut silent = false;
    while !args.is_done() {
        if args.match_keyword("as").is_some() {
            alias = Some(args.expect_identifier()?.val.clone());
            silent = args.match_identifier("silent").is_some();
            break;
        }
        values.push(args.parse_expression()?);
        args.match_symbol(",");
    }
    if values.is_empty() {
        return Err(args.error("cycle needs at least one value"));
    }
    Ok(Box::new(CycleStatement { values, alias, silent }))
}

#[derive(Debug)]
struct FirstOfStatement {
    values: Vec<Expr>,
}

impl Statement for FirstOfStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        for expr in &self.values {
            let value = expr.evaluate(ctx)?;
            if value.is_truthy() {
                return ctx.write_value(out, &value);
            }
        }
        Ok(())
    }
}

pub(super) fn parse_firstof(_doc: &mut DocParser<'_>, _start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let mut values = Vec::new();
    while !args.is_done() {
        values.push(args.parse_expression()?);
    }
    if values.is_empty() {
        return Err(args.error("firstof needs at least one value"));
    }
    Ok(Box::new(FirstOfStatement { values }))
}

#[cfg(test)]
mod tests {
    use crate::engine::{Context, TemplateSet, Value};
    use indexmap::IndexMap;

    fn render(src: &str, ctx: &Context) -> String {
        let set = TemplateSet::new("control", Vec::new());
        set.from_string(src).unwrap().execute(ctx).unwrap()
    }

    fn context() -> Context {
        let mut ctx = Context::new();
        ctx.insert("items", vec!["a", "b", "c"]);
        ctx.insert("n", 5);
        let mut map = IndexMap::new();
        map.insert("b".to_string(), Value::from(2));
        map.insert("a".to_string(), Value::from(1));
        ctx.insert("map", map);
        ctx
    }

    #[test]
    fn test_if_branches() {
        let ctx = context();
        let src = "{% if n > 10 %}big{% elif n > 3 %}mid{% else %}small{% endif %}";
        assert_eq!(render(src, &ctx), "mid");
        assert_eq!(render("{% if missing %}yes{% endif %}", &ctx), "");
        assert_eq!(render("{% if not missing %}yes{% endif %}", &ctx), "yes");
    }

    #[test]
    fn test_if_requires_condition() {
        let set = TemplateSet::new("control", Vec::new());
        assert!(set.from_string("{% if %}x{% endif %}").is_err());
        assert!(set.from_string("{% if a %}x{% else %}y{% elif b %}z{% endif %}").is_err());
    }

    #[test]
    fn test_for_loop_variables() {
        let ctx = context();
        let src = "{% for x in items %}{{ forloop.Counter }}{{ x }}{% if not forloop.Last %},{% endif %}{% endfor %}";
        assert_eq!(render(src, &ctx), "1a,2b,3c");
        let src = "{% for x in items reversed %}{{ x }}{{ forloop.Revcounter0 }}{% endfor %}";
        assert_eq!(render(src, &ctx), "c2b1a0");
    }

    #[test]
    fn test_for_loop_counters() {
        let ctx = context();
        let src = "{% for x in items %}{{ x }}:{{ forloop.Counter }}/{{ forloop.Counter0 }}/{{ forloop.Revcounter }}/{{ forloop.Revcounter0 }}/{{ forloop.First }}/{{ forloop.Last }};{% endfor %}";
        assert_eq!(
            render(src, &ctx),
            "a:1/0/3/2/True/False;b:2/1/2/1/False/False;c:3/2/1/0/False/True;"
        );
    }

    #[test]
    fn test_for_pairs() {
        let ctx = context();
        assert_eq!(render("{% for k, v in map %}{{ k }}={{ v }};{% endfor %}", &ctx), "a=1;b=2;");
        assert_eq!(render("{% for k in map %}{{ k }}{% endfor %}", &ctx), "ab");
        assert_eq!(render("{% for i, x in items %}{{ i }}{{ x }}{% endfor %}", &ctx), "0a1b2c");
    }

    #[test]
    fn test_for_sorted_and_empty() {
        let mut ctx = context();
        ctx.insert("nums", vec![3, 1, 2]);
        assert_eq!(render("{% for x in nums sorted %}{{ x }}{% endfor %}", &ctx), "123");
        assert_eq!(render("{% for x in nums sorted reversed %}{{ x }}{% endfor %}", &ctx), "321");
        assert_eq!(render("{% for x in missing %}x{% empty %}none{% endfor %}", &ctx), "none");
    }

    #[test]
    fn test_nested_loops_see_parent() {
        let ctx = context();
        let src = "{% for x in items %}{% for y in items %}{% if forloop.First %}{{ forloop.Parentloop.Counter }}{% endif %}{% endfor %}{% endfor %}";
        assert_eq!(render(src, &ctx), "123");
    }

    #[test]
    fn test_loop_variables_do_not_leak() {
        let ctx = context();
        assert_eq!(render("{% for x in items %}{% endfor %}[{{ x }}]", &ctx), "[]");
    }

    #[test]
    fn test_ifequal() {
        let ctx = context();
        assert_eq!(render("{% ifequal n 5 %}five{% endifequal %}", &ctx), "five");
        assert_eq!(render("{% ifnotequal n 5 %}x{% else %}same{% endifnotequal %}", &ctx), "same");
    }

    #[test]
    fn test_cycle_and_firstof() {
        let ctx = context();
        let src = "{% for x in items %}{% cycle \"odd\" \"even\" %} {% endfor %}";
        assert_eq!(render(src, &ctx), "odd even odd ");
        let src = "{% for x in items %}{% cycle \"r1\", \"r2\" as row silent %}{{ row }}{% endfor %}";
        assert_eq!(render(src, &ctx), "r1r2r1");
        assert_eq!(render("{% firstof missing \"\" n %}", &ctx), "5");
        assert_eq!(render("{% firstof missing %}", &ctx), "");
    }
}
