//! Render data and per-render execution state

use super::ast::{MacroDef, Node, NodeList};
use super::error::Error;
use super::set::TemplateSet;
use super::template::{Parent, RenderOptions, Template};
use super::value::{Function, Value};
use crate::filters::html_escape;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Caller supplied template data
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.vars.insert(name.to_string(), value.into());
    }

    /// Insert any serializable value
    pub fn insert_serialize<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), Error> {
        let value = Value::from_serialize(value)?;
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Build a context from a serializable struct or map
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let json = serde_json::to_value(value)
            .map_err(|e| Error::execution(format!("cannot convert context: {}", e)))?;
        Self::from_json(json)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, Error> {
        match json {
            serde_json::Value::Object(map) => Ok(Self {
                vars: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(Error::execution(format!(
                "context must be a mapping, got {}",
                Value::from_json(other).type_name()
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Copy all entries of `other` into this context, overwriting existing keys
    pub fn merge(&mut self, other: &Context) {
        for (k, v) in &other.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Every key must be usable as a template identifier
    pub(crate) fn check_identifiers(&self) -> Result<(), Error> {
        for key in self.vars.keys() {
            let mut chars = key.chars();
            let valid = chars.next().map_or(false, |c| c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric());
            if !valid {
                return Err(Error::execution(format!(
                    "context key '{}' is not a valid identifier",
                    key
                )));
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref BLOCK_VARIABLE: Value = {
        let mut members = IndexMap::new();
        members.insert(
            "Super".to_string(),
            Value::Func(Function::with_context("Super", |ctx, _| ctx.render_super())),
        );
        Value::from(members)
    };
}

/// State of a single render
///
/// Lookups go through the private scope frames (innermost first), then the
/// caller's context, then the set's globals.
pub struct ExecutionContext<'a> {
    set: Option<&'a TemplateSet>,
    public: &'a Context,
    globals: Arc<Context>,
    scopes: Vec<HashMap<String, Value>>,
    autoescape: bool,
    chain: Vec<Arc<Template>>,
    blocks: Vec<Vec<NodeList>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(set: Option<&'a TemplateSet>, public: &'a Context, options: &RenderOptions) -> Self {
        let globals = set.map(TemplateSet::globals).unwrap_or_default();
        Self {
            set,
            public,
            globals,
            scopes: vec![Self::base_frame()],
            autoescape: options.autoescape,
            chain: Vec::new(),
            blocks: Vec::new(),
            depth: 0,
            max_depth: options.max_recursion_depth,
        }
    }

    fn base_frame() -> HashMap<String, Value> {
        let mut frame = HashMap::new();
        frame.insert("block".to_string(), BLOCK_VARIABLE.clone());
        frame
    }

    /// The owning template set, needed for includes and dynamic extends
    pub fn set(&self) -> Result<&'a TemplateSet, Error> {
        self.set
            .ok_or_else(|| Error::execution("the template set of this template has been dropped"))
    }

    pub fn lookup(&self, name: &str) -> Value {
        for frame in self.scopes.iter().rev() {
            if let Some(value) = frame.get(name) {
                return value.clone();
            }
        }
        if let Some(value) = self.public.get(name) {
            return value.clone();
        }
        self.globals.get(name).cloned().unwrap_or(Value::Nil)
    }

    /// Bind a variable in the innermost private frame
    pub fn set_var(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Run `f` with a new private frame holding `vars`
    pub fn scoped<R, F>(&mut self, vars: Vec<(String, Value)>, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        self.scopes.push(vars.into_iter().collect());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Like [`scoped`](Self::scoped) but hides all enclosing private frames
    pub fn isolated<R, F>(&mut self, vars: Vec<(String, Value)>, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        let saved = std::mem::replace(
            &mut self.scopes,
            vec![Self::base_frame(), vars.into_iter().collect()],
        );
        let result = f(self);
        self.scopes = saved;
        result
    }

    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    /// Run `f` with the autoescape flag set, restoring the previous value afterwards
    pub fn with_autoescape<R, F>(&mut self, enabled: bool, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        let previous = std::mem::replace(&mut self.autoescape, enabled);
        let result = f(self);
        self.autoescape = previous;
        result
    }

    /// Run `f` one level deeper, failing once the recursion ceiling is hit
    pub fn recurse<R, F>(&mut self, what: &str, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        if self.depth >= self.max_depth {
            return Err(Error::execution(format!(
                "maximum recursion depth of {} exceeded in {}",
                self.max_depth, what
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn execute_nodes(&mut self, nodes: &[Node], out: &mut dyn fmt::Write) -> Result<(), Error> {
        for node in nodes {
            node.execute(self, out)?;
        }
        Ok(())
    }

    pub fn render_to_string(&mut self, nodes: &[Node]) -> Result<String, Error> {
        let mut buf = String::new();
        self.execute_nodes(nodes, &mut buf)?;
        Ok(buf)
    }

    /// Print a value, escaping it unless it is safe or autoescape is off
    pub fn write_value(&self, out: &mut dyn fmt::Write, value: &Value) -> Result<(), Error> {
        if self.autoescape && !value.is_safe() {
            out.write_str(&html_escape(&value.to_string()))?;
        } else {
            write!(out, "{}", value)?;
        }
        Ok(())
    }

    /// Render `template`, following its inheritance chain to the root
    pub fn render_template(&mut self, template: &Arc<Template>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let chain = self.build_chain(template)?;
        let saved = std::mem::replace(&mut self.chain, chain);
        let result = match self.chain.first().cloned() {
            Some(root) => self.execute_nodes(root.nodes(), out),
            None => Ok(()),
        };
        self.chain = saved;
        result
    }

    fn build_chain(&mut self, template: &Arc<Template>) -> Result<Vec<Arc<Template>>, Error> {
        let mut chain = vec![Arc::clone(template)];
        loop {
            let current = match chain.last() {
                Some(current) => Arc::clone(current),
                None => break,
            };
            let parent = match current.parent() {
                None => break,
                Some(Parent::Static(parent)) => Arc::clone(parent),
                Some(Parent::Dynamic { expr, position }) => {
                    let name = expr.evaluate(self).map_err(|e| e.located(position))?;
                    let name = name.as_str().ok_or_else(|| {
                        Error::execution(format!(
                            "extends expects a template name, got {}",
                            name.type_name()
                        ))
                        .located(position)
                    })?;
                    match self.set()?.load_at_runtime(Some(current.name()), name) {
                        Ok(parent) => parent,
                        Err(e) if e.is_loader_error() => {
                            return Err(Error::execution(format!(
                                "cannot extend '{}': {}",
                                name,
                                e.message()
                            ))
                            .with_cause(e)
                            .located(position))
                        }
                        Err(e) => return Err(e.located(position)),
                    }
                }
            };
            if chain.iter().any(|t| Arc::ptr_eq(t, &parent) || t.name() == parent.name()) {
                return Err(Error::execution(format!(
                    "cyclic inheritance: '{}' extends '{}'",
                    current.name(),
                    parent.name()
                )));
            }
            if chain.len() >= self.max_depth {
                return Err(Error::execution(format!(
                    "inheritance chain of '{}' is deeper than {}",
                    template.name(),
                    self.max_depth
                )));
            }
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Render the most derived override of a block, keeping the rest for `block.Super`
    pub(crate) fn render_block(&mut self, name: &str, own: &NodeList, out: &mut dyn fmt::Write) -> Result<(), Error> {
        let mut bodies: Vec<NodeList> = self
            .chain
            .iter()
            .filter_map(|t| t.block(name).cloned())
            .collect();
        let body = bodies.pop().unwrap_or_else(|| Arc::clone(own));
        self.blocks.push(bodies);
        let result = self.execute_nodes(&body, out);
        self.blocks.pop();
        result
    }

    fn render_super(&mut self) -> Result<Value, Error> {
        let (body, rest) = match self.blocks.last().and_then(|bodies| bodies.split_last()) {
            Some((body, rest)) => (Arc::clone(body), rest.to_vec()),
            None => return Ok(Value::safe("")),
        };
        self.blocks.push(rest);
        let result = self.render_to_string(&body);
        self.blocks.pop();
        Ok(Value::safe(result?))
    }

    /// Invoke a macro with positional arguments, returning its output as a safe string
    pub(crate) fn call_macro(&mut self, def: &MacroDef, args: &[Value]) -> Result<Value, Error> {
        let what = format!("macro '{}'", def.name);
        self.recurse(&what, |ctx| {
            let mut vars = Vec::with_capacity(def.params.len());
            for (i, (name, default)) in def.params.iter().enumerate() {
                let value = match (args.get(i), default) {
                    (Some(value), _) => value.clone(),
                    (None, Some(expr)) => expr.evaluate(ctx)?,
                    (None, None) => Value::Nil,
                };
                vars.push((name.clone(), value));
            }
            let output = ctx.scoped(vars, |ctx| ctx.render_to_string(&def.body))?;
            Ok(Value::safe(output))
        })
    }
}
