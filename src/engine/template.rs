//! Compiled templates

use super::ast::{Expr, MacroDef, Node, NodeList};
use super::context::{Context, ExecutionContext};
use super::error::{Error, Position};
use super::lexer::Token;
use super::set::{SetInner, TemplateSet};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

/// Parent of an extending template
pub enum Parent {
    /// Named by a string literal and compiled together with the child
    Static(Arc<Template>),
    /// Any other expression, evaluated on every render
    Dynamic { expr: Expr, position: Position },
}

impl fmt::Debug for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parent::Static(template) => write!(f, "Static({})", template.name()),
            Parent::Dynamic { expr, .. } => write!(f, "Dynamic({:?})", expr),
        }
    }
}

/// Render settings captured from the set when the template is compiled
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub autoescape: bool,
    pub max_recursion_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            autoescape: true,
            max_recursion_depth: 100,
        }
    }
}

pub struct Template {
    pub(crate) name: Arc<str>,
    pub(crate) source: String,
    pub(crate) tokens: Vec<Token>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) parent: Option<Parent>,
    pub(crate) blocks: HashMap<String, NodeList>,
    pub(crate) macros: HashMap<String, Arc<MacroDef>>,
    pub(crate) level: usize,
    pub(crate) options: RenderOptions,
    pub(crate) set: Weak<SetInner>,
}

/// Adapts an `io::Write` sink for the executor, keeping the first IO error
struct IoWriter<W: io::Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: io::Write> fmt::Write for IoWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn parent(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    /// Number of statically known ancestors
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn block(&self, name: &str) -> Option<&NodeList> {
        self.blocks.get(name)
    }

    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn exported_macro(&self, name: &str) -> Option<&Arc<MacroDef>> {
        self.macros.get(name)
    }

    /// A line of the template source, 1-based
    pub fn raw_line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1).and_then(|idx| self.source.lines().nth(idx))
    }

    /// Render into a string
    pub fn execute(self: &Arc<Self>, context: &Context) -> Result<String, Error> {
        let mut out = String::new();
        self.execute_to(context, &mut out)?;
        Ok(out)
    }

    /// Render straight into an `io::Write`; output already written is not retracted on error
    pub fn execute_writer<W: io::Write>(self: &Arc<Self>, context: &Context, writer: W) -> Result<(), Error> {
        let mut sink = IoWriter {
            inner: writer,
            error: None,
        };
        let result = self.execute_to(context, &mut sink);
        if let Some(e) = sink.error.take() {
            return Err(Error::Io(e));
        }
        result?;
        sink.inner.flush()?;
        Ok(())
    }

    pub fn execute_to(self: &Arc<Self>, context: &Context, out: &mut dyn fmt::Write) -> Result<(), Error> {
        context.check_identifiers()?;
        let set = self.set.upgrade().map(TemplateSet::from_inner);
        let mut ctx = ExecutionContext::new(set.as_ref(), context, &self.options);
        ctx.render_template(self, out)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("blocks", &self.block_names())
            .field("level", &self.level)
            .finish()
    }
}
