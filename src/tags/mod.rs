//! Built-in tags
//!
//! Every tag parser receives the document parser, the token naming the tag and
//! a cursor over the tag's arguments, and returns the statement to execute.
//! Tags with a body call [`DocParser::wrap_until`] for it.

mod control;
mod inherit;
mod scope;
mod text;

use crate::engine::{DocParser, Error, Parser, Registry, Statement, Token};
use std::sync::Arc;

type TagParser = fn(&mut DocParser<'_>, &Token, &mut Parser<'_>) -> Result<Box<dyn Statement>, Error>;

const BUILTINS: &[(&str, TagParser)] = &[
    // control flow
    ("if", control::parse_if),
    ("ifequal", control::parse_ifequal),
    ("ifnotequal", control::parse_ifnotequal),
    ("for", control::parse_for),
    ("cycle", control::parse_cycle),
    ("firstof", control::parse_firstof),
    // inheritance and composition
    ("block", inherit::parse_block),
    ("extends", inherit::parse_extends),
    ("include", inherit::parse_include),
    ("import", inherit::parse_import),
    // scoping
    ("with", scope::parse_with),
    ("set", scope::parse_set),
    ("macro", scope::parse_macro),
    ("autoescape", scope::parse_autoescape),
    ("filter", scope::parse_filter),
    // text
    ("spaceless", text::parse_spaceless),
    ("comment", text::parse_comment),
    ("now", text::parse_now),
    ("templatetag", text::parse_templatetag),
    ("widthratio", text::parse_widthratio),
];

pub(crate) fn register_builtins(registry: &mut Registry) {
    for (name, parser) in BUILTINS {
        registry.insert_tag(name, Arc::new(*parser));
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Context, DocParser, Error, ExecutionContext, Parser, Statement, TemplateSet, Token};
    use std::fmt;

    #[derive(Debug)]
    struct Shout {
        body: Vec<crate::engine::Node>,
    }

    impl Statement for Shout {
        fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
            let text = ctx.render_to_string(&self.body)?;
            out.write_str(&text.to_uppercase())?;
            Ok(())
        }
    }

    #[test]
    fn test_custom_tag_with_body() {
        let set = TemplateSet::new("tags", Vec::new());
        set.register_tag(
            "shout",
            |doc: &mut DocParser<'_>, start: &Token, _args: &mut Parser<'_>| -> Result<Box<dyn Statement>, Error> {
                let wrapped = doc.wrap_until(&["endshout"], start)?;
                wrapped.args.expect_done("endshout")?;
                Ok(Box::new(Shout { body: wrapped.nodes }))
            },
        )
        .unwrap();
        let tpl = set.from_string("{% shout %}hi {{ who }}{% endshout %}!").unwrap();
        let mut ctx = Context::new();
        ctx.insert("who", "you");
        assert_eq!(tpl.execute(&ctx).unwrap(), "HI YOU!");
    }

    #[test]
    fn test_builtin_tag_cannot_be_registered_twice() {
        let set = TemplateSet::new("tags", Vec::new());
        let result = set.register_tag(
            "if",
            |_: &mut DocParser<'_>, _: &Token, _: &mut Parser<'_>| -> Result<Box<dyn Statement>, Error> {
                Err(Error::execution("unused"))
            },
        );
        assert!(result.is_err());
    }
}
