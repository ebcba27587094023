//! Template inheritance and composition: `block`, `extends`, `include`, `import`

use super::scope::{evaluate_assignments, macro_function, parse_assignments};
use crate::engine::{
    DocParser, Error, ExecutionContext, Expr, MacroDef, NodeList, Parent, Parser, Statement, Template,
    Token, TokenKind, Value,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct BlockStatement {
    name: String,
    body: NodeList,
}

impl Statement for BlockStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        ctx.render_block(&self.name, &self.body, out)
    }
}

/// `{% block name %}...{% endblock [name] %}`
pub(super) fn parse_block(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let name = args.expect_identifier()?.val.clone();

    let wrapped = doc.wrap_until(&["endblock"], start)?;
    let mut end_args = wrapped.args;
    if let Some(end_name) = end_args.match_kind(TokenKind::Identifier) {
        if end_name.val != name {
            return Err(Error::parse(
                end_name.position(),
                format!("endblock '{}' does not match block '{}'", end_name.val, name),
            ));
        }
    }
    end_args.expect_done("endblock")?;

    let body: NodeList = Arc::new(wrapped.nodes);
    doc.register_block(&name, Arc::clone(&body), start)?;
    Ok(Box::new(BlockStatement { name, body }))
}

/// Emits nothing; the parent is recorded on the template
#[derive(Debug)]
struct ExtendsStatement;

impl Statement for ExtendsStatement {
    fn execute(&self, _ctx: &mut ExecutionContext<'_>, _out: &mut dyn fmt::Write) -> Result<(), Error> {
        Ok(())
    }
}

/// `{% extends "base.html" %}` or `{% extends layout_name %}`
pub(super) fn parse_extends(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    if doc.has_parent() {
        return Err(Error::parse(
            start.position(),
            "a template can only extend one parent",
        ));
    }
    if !doc.is_first_tag() {
        return Err(Error::parse(
            start.position(),
            "extends must be the first tag in the template",
        ));
    }

    let expr = args.parse_expression()?;
    let literal = expr.as_literal_str().map(str::to_string);
    let parent = match literal {
        Some(name) => match doc.load_template(&name, start)? {
            Some(template) => Parent::Static(template),
            None => {
                return Err(Error::parse(
                    start.position(),
                    format!("cyclic inheritance: '{}' is already being compiled", name),
                ))
            }
        },
        None => Parent::Dynamic {
            expr,
            position: start.position(),
        },
    };
    doc.set_parent(parent);
    Ok(Box::new(ExtendsStatement))
}

#[derive(Debug)]
enum IncludeTarget {
    /// Compiled together with the including template
    Static(Arc<Template>),
    /// Resolved on every render
    Lazy(Expr),
}

#[derive(Debug)]
struct IncludeStatement {
    target: IncludeTarget,
    base: String,
    vars: Vec<(String, Expr)>,
    only: bool,
    if_exists: bool,
}

impl IncludeStatement {
    fn resolve(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<Arc<Template>>, Error> {
        let expr = match &self.target {
            IncludeTarget::Static(template) => return Ok(Some(Arc::clone(template))),
            IncludeTarget::Lazy(expr) => expr,
        };
        let value = expr.evaluate(ctx)?;
        let Some(name) = value.as_str() else {
            return Err(Error::execution(format!(
                "include expects a template name, got {}",
                value.type_name()
            )));
        };
        match ctx.set()?.load_at_runtime(Some(&self.base), name) {
            Ok(template) => Ok(Some(template)),
            Err(e) if e.is_loader_error() && self.if_exists => {
                tracing::warn!(template = name, from = %self.base, "skipping missing include");
                Ok(None)
            }
            Err(e) if e.is_loader_error() => Err(Error::execution(format!(
                "cannot include '{}': {}",
                name,
                e.message()
            ))
            .with_cause(e)),
            Err(e) => Err(e),
        }
    }
}

impl Statement for IncludeStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let Some(template) = self.resolve(ctx)? else {
            return Ok(());
        };
        let vars = evaluate_assignments(ctx, &self.vars)?;
        ctx.recurse("include", |ctx| {
            if self.only {
                ctx.isolated(vars, |ctx| ctx.render_template(&template, out))
            } else {
                ctx.scoped(vars, |ctx| ctx.render_template(&template, out))
            }
        })
    }
}

/// `{% include "name" [if_exists] [with key=value...] [only] %}`
pub(super) fn parse_include(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let expr = args.parse_expression()?;
    let mut vars = Vec::new();
    let mut only = false;
    let mut if_exists = false;
    loop {
        if args.match_identifier("if_exists").is_some() {
            if_exists = true;
        } else if args.match_identifier("only").is_some() {
            only = true;
        } else if args.match_identifier("with").is_some() {
            let pairs = parse_assignments(args)?;
            if pairs.is_empty() {
                return Err(args.error("expected 'name=value' after 'with'"));
            }
            vars.extend(pairs);
        } else {
            break;
        }
    }

    // missing templates are only detectable at render time when if_exists is set
    let literal = expr.as_literal_str().map(str::to_string);
    let target = match literal {
        Some(name) if !if_exists => match doc.load_template(&name, start)? {
            Some(template) => IncludeTarget::Static(template),
            None => IncludeTarget::Lazy(expr),
        },
        _ => IncludeTarget::Lazy(expr),
    };

    Ok(Box::new(IncludeStatement {
        target,
        base: doc.template_name().to_string(),
        vars,
        only,
        if_exists,
    }))
}

#[derive(Debug)]
struct ImportStatement {
    macros: Vec<(String, Arc<MacroDef>)>,
}

impl Statement for ImportStatement {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, _out: &mut dyn fmt::Write) -> Result<(), Error> {
        for (alias, def) in &self.macros {
            ctx.set_var(alias, Value::Func(macro_function(def)));
        }
        Ok(())
    }
}

/// `{% import "macros.html" card, button as btn %}`
pub(super) fn parse_import(doc: &mut DocParser<'_>, start: &Token, args: &mut Parser<'_>) -> Result<Box<dyn Statement>, Error> {
    let file = args.expect_string()?;
    let template = doc.load_template(&file.val, start)?.ok_or_else(|| {
        Error::parse(
            file.position(),
            format!("cyclic import: '{}' is already being compiled", file.val),
        )
    })?;

    let mut macros = Vec::new();
    loop {
        let name = args.expect_identifier()?;
        let def = template.exported_macro(&name.val).ok_or_else(|| {
            Error::parse(
                name.position(),
                format!("'{}' does not export a macro named '{}'", file.val, name.val),
            )
        })?;
        let alias = match args.match_keyword("as") {
            Some(_) => args.expect_identifier()?.val.clone(),
            None => name.val.clone(),
        };
        macros.push((alias, Arc::clone(def)));
        if args.match_symbol(",").is_none() {
            break;
        }
    }
    Ok(Box::new(ImportStatement { macros }))
}

#[cfg(test)]
mod tests {
    use crate::config::SetConfig;
    use crate::engine::{Context, Error, MemoryLoader, TemplateSet};
    use std::sync::Arc;

    fn memory_set(templates: &[(&str, &str)]) -> TemplateSet {
        let mut loader = MemoryLoader::new();
        for (name, source) in templates {
            loader.insert(name, source);
        }
        TemplateSet::new("inherit", vec![Arc::new(loader)])
    }

    #[test]
    fn test_block_override() {
        let set = memory_set(&[("base", "<{% block c %}BASE{% endblock %}>")]);
        let tpl = set
            .compile("child", "{% extends \"base\" %}{% block c %}CHILD{% endblock %}")
            .unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "<CHILD>");
    }

    #[test]
    fn test_block_super() {
        let set = memory_set(&[("base", "{% block c %}BASE{% endblock %}")]);
        let tpl = set
            .compile(
                "child",
                "{% extends \"base\" %}{% block c %}{{ block.Super }}CHILD{% endblock %}",
            )
            .unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "BASECHILD");
    }

    #[test]
    fn test_three_level_super_chain() {
        let set = memory_set(&[
            ("base", "[{% block c %}A{% endblock %}]"),
            ("mid", "{% extends \"base\" %}{% block c %}{{ block.Super }}B{% endblock %}"),
        ]);
        let tpl = set
            .compile("leaf", "{% extends \"mid\" %}{% block c %}{{ block.Super }}C{% endblock %}")
            .unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "[ABC]");
    }

    #[test]
    fn test_block_defaults_and_nested_blocks() {
        let set = memory_set(&[(
            "base",
            "{% block outer %}({% block inner %}in{% endblock %}){% endblock %}{% block tail %}T{% endblock %}",
        )]);
        let tpl = set
            .compile("child", "{% extends \"base\" %}{% block inner %}IN{% endblock inner %}")
            .unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "(IN)T");
    }

    #[test]
    fn test_endblock_name_must_match() {
        let set = memory_set(&[]);
        let err = set.from_string("{% block a %}{% endblock b %}").unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_extends_must_come_first() {
        let set = memory_set(&[("base", "")]);
        let err = set.from_string("text {% extends \"base\" %}").unwrap_err();
        assert!(err.to_string().contains("first tag"));
        assert!(set.from_string("  \n{% extends \"base\" %}").is_ok());
        assert!(set
            .from_string("{% extends \"base\" %}{% extends \"base\" %}")
            .is_err());
    }

    #[test]
    fn test_cyclic_extends() {
        let set = memory_set(&[
            ("a", "{% extends \"b\" %}"),
            ("b", "{% extends \"a\" %}"),
        ]);
        let err = set.from_cache("a").unwrap_err();
        assert!(err.to_string().contains("cyclic inheritance"));
    }

    #[test]
    fn test_dynamic_extends() {
        let set = memory_set(&[
            ("one", "1:{% block b %}{% endblock %}"),
            ("two", "2:{% block b %}{% endblock %}"),
        ]);
        let tpl = set
            .compile("child", "{% extends layout %}{% block b %}x{% endblock %}")
            .unwrap();
        let mut ctx = Context::new();
        ctx.insert("layout", "one");
        assert_eq!(tpl.execute(&ctx).unwrap(), "1:x");
        ctx.insert("layout", "two");
        assert_eq!(tpl.execute(&ctx).unwrap(), "2:x");
        ctx.insert("layout", "missing");
        let err = tpl.execute(&ctx).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }), "{:?}", err);
        let pos = err.position().unwrap();
        assert_eq!((&*pos.template, pos.line, pos.column), ("child", 1, 4));
        assert!(err.to_string().contains("cannot extend 'missing'"));
    }

    #[test]
    fn test_include_scoping() {
        let set = memory_set(&[("part", "{{ name }}|{{ extra }}")]);
        let mut ctx = Context::new();
        ctx.insert("name", "outer");
        let tpl = set
            .from_string("{% with name=\"inner\" %}{% include \"part\" with extra=1 %}{% endwith %}")
            .unwrap();
        assert_eq!(tpl.execute(&ctx).unwrap(), "inner|1");

        let tpl = set
            .from_string("{% with name=\"inner\" %}{% include \"part\" with extra=1 only %}{% endwith %}")
            .unwrap();
        assert_eq!(tpl.execute(&ctx).unwrap(), "outer|1");
    }

    #[test]
    fn test_include_if_exists() {
        let set = memory_set(&[]);
        let tpl = set.from_string("a{% include \"nope\" if_exists %}b").unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "ab");

        let err = set.from_string("{% include \"nope\" %}").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let tpl = set.from_string("{% include name %}").unwrap();
        let mut ctx = Context::new();
        ctx.insert("name", "nope");
        assert!(matches!(tpl.execute(&ctx).unwrap_err(), Error::Execution { .. }));
    }

    #[test]
    fn test_recursive_include_hits_ceiling() {
        let config = SetConfig {
            max_recursion_depth: 20,
            ..SetConfig::default()
        };
        let set = TemplateSet::with_config("inherit", config).unwrap();
        set.add_loader(Arc::new(MemoryLoader::new().with("self", "x{% include \"self\" %}")));
        let err = set.render("self", &Context::new()).unwrap_err();
        assert!(err.to_string().contains("maximum recursion depth"));
    }

    #[test]
    fn test_import_macros() {
        let set = memory_set(&[(
            "macros",
            "{% macro hello(name) export %}Hello {{ name }}{% endmacro %}\
             {% macro hidden() %}no{% endmacro %}",
        )]);
        let tpl = set
            .from_string("{% import \"macros\" hello, hello as hi %}{{ hello(\"a\") }} {{ hi(\"b\") }}")
            .unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "Hello a Hello b");

        let err = set.from_string("{% import \"macros\" hidden %}").unwrap_err();
        assert!(err.to_string().contains("does not export"));
    }
}
