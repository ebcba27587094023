//! Document parser and the token cursor handed to tag parsers
//!
//! [`DocParser`] walks the token stream of a whole template, turning text into
//! [`Node::Text`], `{{ }}` into output nodes and dispatching `{% %}` to the tag
//! parsers in the registry. Each tag parser receives a [`Parser`] positioned on
//! the tag's arguments and must consume all of them.

mod expr;

use super::ast::{MacroDef, Node, NodeList, OutputNode, TagNode};
use super::error::{Error, Position};
use super::lexer::{Token, TokenKind};
use super::registry::Registry;
use super::set::{Resolved, TemplateSet};
use super::template::{Parent, Template};
use std::collections::HashMap;
use std::sync::Arc;

/// Cursor over the argument tokens of a single tag
pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    registry: &'a Registry,
    end: Position,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token], registry: &'a Registry, end: Position, max_depth: usize) -> Self {
        Self {
            tokens,
            idx: 0,
            registry,
            end,
            depth: 0,
            max_depth,
        }
    }

    pub fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.idx)
    }

    pub fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.idx + offset)
    }

    pub fn consume(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.idx);
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.idx)
    }

    pub fn is_done(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    pub fn peek_symbol(&self, symbol: &str) -> bool {
        self.current().map_or(false, |t| t.is_symbol(symbol))
    }

    pub fn peek_keyword(&self, keyword: &str) -> bool {
        self.current().map_or(false, |t| t.is_keyword(keyword))
    }

    pub fn match_symbol(&mut self, symbol: &str) -> Option<&'a Token> {
        if self.peek_symbol(symbol) {
            self.consume()
        } else {
            None
        }
    }

    pub fn match_keyword(&mut self, keyword: &str) -> Option<&'a Token> {
        if self.peek_keyword(keyword) {
            self.consume()
        } else {
            None
        }
    }

    /// Consume a specific identifier such as `reversed` or `only`
    pub fn match_identifier(&mut self, name: &str) -> Option<&'a Token> {
        if self.current().map_or(false, |t| t.is_identifier(name)) {
            self.consume()
        } else {
            None
        }
    }

    pub fn match_kind(&mut self, kind: TokenKind) -> Option<&'a Token> {
        if self.current().map_or(false, |t| t.kind == kind) {
            self.consume()
        } else {
            None
        }
    }

    pub fn expect_symbol(&mut self, symbol: &str) -> Result<&'a Token, Error> {
        self.match_symbol(symbol)
            .ok_or_else(|| self.error(format!("expected '{}'", symbol)))
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<&'a Token, Error> {
        self.match_keyword(keyword)
            .ok_or_else(|| self.error(format!("expected '{}'", keyword)))
    }

    pub fn expect_identifier(&mut self) -> Result<&'a Token, Error> {
        self.match_kind(TokenKind::Identifier)
            .ok_or_else(|| self.error("expected an identifier"))
    }

    pub fn expect_string(&mut self) -> Result<&'a Token, Error> {
        self.match_kind(TokenKind::String)
            .ok_or_else(|| self.error("expected a string"))
    }

    /// Fail if any argument tokens are left over
    pub fn expect_done(&self, tag: &str) -> Result<(), Error> {
        match self.current() {
            None => Ok(()),
            Some(token) => Err(Error::parse(
                token.position(),
                format!("unexpected {} in '{}'", token, tag),
            )),
        }
    }

    /// An error at the current token, or at the closing delimiter when exhausted
    pub fn error(&self, message: impl Into<String>) -> Error {
        let message = message.into();
        match self.current() {
            Some(token) => Error::parse(token.position(), format!("{}, found {}", message, token)),
            None => Error::parse(self.end.clone(), format!("{}, found end of tag", message)),
        }
    }

    pub(crate) fn registry(&self) -> &'a Registry {
        self.registry
    }
}

/// Result of [`DocParser::wrap_until`]
pub struct Wrapped<'a> {
    pub nodes: Vec<Node>,
    /// Name of the end tag that stopped the wrap
    pub name: String,
    pub end_tag: &'a Token,
    /// Arguments written after the end tag's name
    pub args: Parser<'a>,
}

/// What a template's parse leaves behind besides its nodes
pub(crate) struct Compiled {
    pub parent: Option<Parent>,
    pub blocks: HashMap<String, NodeList>,
    pub macros: HashMap<String, Arc<MacroDef>>,
}

pub struct DocParser<'a> {
    name: Arc<str>,
    set: &'a TemplateSet,
    registry: &'a Registry,
    tokens: &'a [Token],
    idx: usize,
    depth: usize,
    max_depth: usize,
    max_nesting: usize,
    stack: Vec<String>,
    seen_content: bool,
    parent: Option<Parent>,
    blocks: HashMap<String, NodeList>,
    macros: HashMap<String, Arc<MacroDef>>,
}

impl<'a> DocParser<'a> {
    pub(crate) fn new(
        name: &str,
        set: &'a TemplateSet,
        registry: &'a Registry,
        tokens: &'a [Token],
        stack: Vec<String>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            set,
            registry,
            tokens,
            idx: 0,
            depth: 0,
            max_depth: set.config().max_expression_depth,
            max_nesting: set.config().max_nesting_depth,
            stack,
            seen_content: false,
            parent: None,
            blocks: HashMap::new(),
            macros: HashMap::new(),
        }
    }

    pub fn template_name(&self) -> &str {
        &self.name
    }

    pub fn set(&self) -> &'a TemplateSet {
        self.set
    }

    pub fn parse(&mut self) -> Result<Vec<Node>, Error> {
        let mut nodes = Vec::new();
        while self.idx < self.tokens.len() {
            nodes.push(self.parse_node()?);
        }
        Ok(nodes)
    }

    pub(crate) fn finish(self) -> Compiled {
        Compiled {
            parent: self.parent,
            blocks: self.blocks,
            macros: self.macros,
        }
    }

    fn parse_node(&mut self) -> Result<Node, Error> {
        let tokens = self.tokens;
        let token = &tokens[self.idx];
        match token.kind {
            TokenKind::Html => {
                self.idx += 1;
                if !token.val.trim().is_empty() {
                    self.seen_content = true;
                }
                Ok(Node::Text(token.val.clone()))
            }
            TokenKind::Symbol if token.val == "{{" => self.parse_output(token),
            TokenKind::Symbol if token.val == "{%" => self.parse_tag(token),
            _ => Err(Error::parse(token.position(), format!("unexpected {}", token))),
        }
    }

    /// Collect the tokens up to the closing delimiter into an argument parser
    fn arguments(&mut self, open: &'a Token, close: &str) -> Result<Parser<'a>, Error> {
        let tokens = self.tokens;
        let start = self.idx;
        let offset = tokens[start..]
            .iter()
            .position(|t| t.kind == TokenKind::Symbol && (t.val == "}}" || t.val == "%}"))
            .ok_or_else(|| Error::parse(open.position(), format!("'{}' is never closed", open.val)))?;
        let end = start + offset;
        let closing = &tokens[end];
        if closing.val != close {
            return Err(Error::parse(
                closing.position(),
                format!("expected '{}' to close '{}', found '{}'", close, open.val, closing.val),
            ));
        }
        self.idx = end + 1;
        Ok(Parser::new(
            &tokens[start..end],
            self.registry,
            closing.position(),
            self.max_depth,
        ))
    }

    fn parse_output(&mut self, open: &'a Token) -> Result<Node, Error> {
        self.idx += 1;
        let mut args = self.arguments(open, "}}")?;
        if args.is_done() {
            return Err(Error::parse(open.position(), "empty variable tag"));
        }
        let expr = args.parse_expression()?;
        args.expect_done("{{ }}")?;
        self.seen_content = true;
        Ok(Node::Output(OutputNode {
            position: open.position(),
            expr,
        }))
    }

    fn parse_tag(&mut self, open: &'a Token) -> Result<Node, Error> {
        let tokens = self.tokens;
        let name = tokens
            .get(self.idx + 1)
            .filter(|t| t.kind == TokenKind::Identifier)
            .ok_or_else(|| Error::parse(open.position(), "expected a tag name after '{%'"))?;
        if self.registry.is_tag_banned(&name.val) {
            return Err(Error::parse(
                name.position(),
                format!("usage of tag '{}' is not allowed (sandbox restriction active)", name.val),
            ));
        }
        let tag_parser = self
            .registry
            .tag(&name.val)
            .cloned()
            .ok_or_else(|| Error::parse(name.position(), format!("tag '{}' does not exist", name.val)))?;

        self.idx += 2;
        let mut args = self.arguments(open, "%}")?;
        let statement = tag_parser(self, name, &mut args)?;
        args.expect_done(&name.val)?;
        self.seen_content = true;
        Ok(Node::Tag(TagNode {
            name: name.val.clone(),
            position: name.position(),
            statement,
        }))
    }

    /// Parse nodes until a `{%` followed by one of `names`
    ///
    /// `opener` is the tag name token of the construct being wrapped; it is
    /// named in the error when the template ends first.
    pub fn wrap_until(&mut self, names: &[&str], opener: &Token) -> Result<Wrapped<'a>, Error> {
        if self.depth >= self.max_nesting {
            return Err(Error::parse(
                opener.position(),
                format!("tags are nested deeper than {} levels", self.max_nesting),
            ));
        }
        self.depth += 1;
        let result = self.wrap_until_inner(names, opener);
        self.depth -= 1;
        result
    }

    fn wrap_until_inner(&mut self, names: &[&str], opener: &Token) -> Result<Wrapped<'a>, Error> {
        let tokens = self.tokens;
        let mut nodes = Vec::new();
        while self.idx < tokens.len() {
            let token = &tokens[self.idx];
            if token.is_symbol("{%") {
                let end = tokens
                    .get(self.idx + 1)
                    .filter(|t| t.kind == TokenKind::Identifier && names.contains(&t.val.as_str()));
                if let Some(end_tag) = end {
                    self.idx += 2;
                    let args = self.arguments(token, "%}")?;
                    return Ok(Wrapped {
                        nodes,
                        name: end_tag.val.clone(),
                        end_tag,
                        args,
                    });
                }
            }
            nodes.push(self.parse_node()?);
        }
        let expected: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
        Err(Error::parse(
            opener.position(),
            format!(
                "'{}' is never closed, expected {}",
                opener.val,
                expected.join(" or ")
            ),
        ))
    }

    /// Parser for an arbitrary token slice, such as a tag's end-tag arguments
    pub fn sub_parser(&self, tokens: &'a [Token], end: Position) -> Parser<'a> {
        Parser::new(tokens, self.registry, end, self.max_depth)
    }

    /// True while nothing but whitespace has been seen at the top level
    pub fn is_first_tag(&self) -> bool {
        self.depth == 0 && !self.seen_content
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn set_parent(&mut self, parent: Parent) {
        self.parent = Some(parent);
    }

    pub fn register_block(&mut self, name: &str, body: NodeList, at: &Token) -> Result<(), Error> {
        if self.blocks.contains_key(name) {
            return Err(Error::parse(
                at.position(),
                format!("block '{}' is defined more than once", name),
            ));
        }
        self.blocks.insert(name.to_string(), body);
        Ok(())
    }

    pub fn export_macro(&mut self, def: Arc<MacroDef>, at: &Token) -> Result<(), Error> {
        if self.macros.contains_key(&def.name) {
            return Err(Error::parse(
                at.position(),
                format!("macro '{}' is exported more than once", def.name),
            ));
        }
        self.macros.insert(def.name.clone(), def);
        Ok(())
    }

    /// Load and compile a template named by a literal, relative to this one
    ///
    /// Returns `None` when the template is currently being compiled further up
    /// the stack; callers decide whether that is a cycle or a lazy reference.
    pub fn load_template(&self, name: &str, at: &Token) -> Result<Option<Arc<Template>>, Error> {
        match self.set.load_for_compile(Some(&*self.name), name, &self.stack) {
            Ok(Resolved::Ready(template)) => Ok(Some(template)),
            Ok(Resolved::InProgress(_)) => Ok(None),
            Err(e) if e.is_loader_error() => Err(Error::parse(
                at.position(),
                format!("cannot load template '{}': {}", name, e.message()),
            )
            .with_cause(e)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Context;
    use crate::engine::loader::MemoryLoader;

    fn set() -> TemplateSet {
        TemplateSet::new("test", Vec::new())
    }

    #[test]
    fn test_unknown_tag() {
        let err = set().from_string("abc {% frobnicate %}").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (1, 8));
        assert!(err.to_string().contains("tag 'frobnicate' does not exist"));
    }

    #[test]
    fn test_unterminated_construct_names_the_tag() {
        let err = set().from_string("{% if a %}{% for x in y %}{% endif %}").unwrap_err();
        assert!(err.to_string().contains("tag 'endif' does not exist"));

        let err = set().from_string("{% if a %}text").unwrap_err();
        assert!(err.to_string().contains("'if' is never closed"));
    }

    #[test]
    fn test_leftover_arguments_are_rejected() {
        let err = set().from_string("{{ a b }}").unwrap_err();
        assert!(err.to_string().contains("unexpected identifier 'b'"));
        let err = set().from_string("{% else extra %}").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_mismatched_delimiters() {
        let err = set().from_string("{{ a %}").unwrap_err();
        assert!(err.to_string().contains("expected '}}'"));
    }

    #[test]
    fn test_empty_output_tag() {
        assert!(set().from_string("{{ }}").is_err());
    }

    #[test]
    fn test_duplicate_block() {
        let err = set()
            .from_string("{% block a %}{% endblock %}{% block a %}{% endblock %}")
            .unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn test_static_load_failure_is_parse_error() {
        let loader = MemoryLoader::new();
        let set = TemplateSet::new("test", vec![Arc::new(loader)]);
        let err = set.from_string("{% extends \"missing.html\" %}").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("missing.html"));
    }

    fn nested_with(levels: usize) -> String {
        format!(
            "{}x{}",
            "{% with a=1 %}".repeat(levels),
            "{% endwith %}".repeat(levels)
        )
    }

    #[test]
    fn test_tag_nesting_limit() {
        let set = set();
        let tpl = set.from_string(&nested_with(20)).unwrap();
        assert_eq!(tpl.execute(&Context::new()).unwrap(), "x");

        let limit = set.config().max_nesting_depth;
        assert!(set.from_string(&nested_with(limit)).is_ok());
        let err = set.from_string(&nested_with(limit + 1)).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("nested deeper"));

        let err = set.from_string(&nested_with(800)).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
        let ifs = format!("{}y{}", "{% if 1 %}".repeat(20000), "{% endif %}".repeat(20000));
        assert!(set.from_string(&ifs).unwrap_err().to_string().contains("nested deeper"));
    }

    #[test]
    fn test_parse_then_render() {
        let set = set();
        let tpl = set.from_string("Hi {{ who }}").unwrap();
        let mut ctx = Context::new();
        ctx.insert("who", "there");
        assert_eq!(tpl.execute(&ctx).unwrap(), "Hi there");
    }
}
