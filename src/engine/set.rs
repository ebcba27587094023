//! Template sets
//!
//! A set bundles a configuration, a filter/tag registry, a chain of loaders,
//! globals and a cache of compiled templates. Sets are independent of each
//! other, so differently sandboxed engines can live in one process.

use super::ast::Statement;
use super::context::Context;
use super::error::Error;
use super::lexer::{Lexer, Token};
use super::loader::{FileSystemLoader, Loader};
use super::parser::{DocParser, Parser};
use super::registry::Registry;
use super::template::{Parent, Template};
use super::value::Value;
use crate::config::SetConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) enum Resolved {
    Ready(Arc<Template>),
    /// The template is being compiled further up the current compile stack
    InProgress(String),
}

pub(crate) struct SetInner {
    name: String,
    config: SetConfig,
    registry: RwLock<Arc<Registry>>,
    loaders: RwLock<Vec<Arc<dyn Loader>>>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
    globals: RwLock<Arc<Context>>,
    compiled_any: AtomicBool,
}

#[derive(Clone)]
pub struct TemplateSet {
    inner: Arc<SetInner>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TemplateSet {
    pub fn new(name: &str, loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self::build(name, SetConfig::default(), loaders)
    }

    /// Build a set from configuration: one filesystem loader per template
    /// directory, bans and globals applied up front
    pub fn with_config(name: &str, config: SetConfig) -> Result<Self, Error> {
        let mut loaders: Vec<Arc<dyn Loader>> = config
            .template_dirs
            .iter()
            .map(|dir| Arc::new(FileSystemLoader::new(dir)) as Arc<dyn Loader>)
            .collect();
        if loaders.is_empty() {
            loaders.push(Arc::new(FileSystemLoader::default()));
        }

        let set = Self::build(name, config.clone(), loaders);
        for filter in &config.banned_filters {
            set.ban_filter(filter)?;
        }
        for tag in &config.banned_tags {
            set.ban_tag(tag)?;
        }
        for (key, value) in &config.globals {
            set.add_global(key, Value::from_json(value.clone()));
        }
        Ok(set)
    }

    fn build(name: &str, config: SetConfig, loaders: Vec<Arc<dyn Loader>>) -> Self {
        tracing::debug!(set = name, loaders = loaders.len(), "created template set");
        Self {
            inner: Arc::new(SetInner {
                name: name.to_string(),
                config,
                registry: RwLock::new(Arc::new(Registry::builtin())),
                loaders: RwLock::new(loaders),
                cache: RwLock::new(HashMap::new()),
                globals: RwLock::new(Arc::new(Context::new())),
                compiled_any: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SetInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &SetConfig {
        &self.inner.config
    }

    pub fn add_loader(&self, loader: Arc<dyn Loader>) {
        write(&self.inner.loaders).push(loader);
    }

    fn loaders(&self) -> Vec<Arc<dyn Loader>> {
        read(&self.inner.loaders).clone()
    }

    /// Snapshot of the registry as seen by the next compilation
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&read(&self.inner.registry))
    }

    fn update_registry<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Registry) -> Result<(), Error>,
    {
        let mut guard = write(&self.inner.registry);
        f(Arc::make_mut(&mut guard))
    }

    pub fn register_filter<F>(&self, name: &str, filter: F) -> Result<(), Error>
    where
        F: Fn(&Value, Option<&Value>) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.update_registry(|r| r.register_filter(name, Arc::new(filter)))
    }

    pub fn replace_filter<F>(&self, name: &str, filter: F) -> Result<(), Error>
    where
        F: Fn(&Value, Option<&Value>) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.update_registry(|r| r.replace_filter(name, Arc::new(filter)))
    }

    pub fn register_tag<F>(&self, name: &str, tag: F) -> Result<(), Error>
    where
        F: Fn(&mut DocParser<'_>, &Token, &mut Parser<'_>) -> Result<Box<dyn Statement>, Error>
            + Send
            + Sync
            + 'static,
    {
        self.update_registry(|r| r.register_tag(name, Arc::new(tag)))
    }

    pub fn replace_tag<F>(&self, name: &str, tag: F) -> Result<(), Error>
    where
        F: Fn(&mut DocParser<'_>, &Token, &mut Parser<'_>) -> Result<Box<dyn Statement>, Error>
            + Send
            + Sync
            + 'static,
    {
        self.update_registry(|r| r.replace_tag(name, Arc::new(tag)))
    }

    fn ensure_not_compiled(&self, what: &str) -> Result<(), Error> {
        if self.inner.compiled_any.load(Ordering::Acquire) {
            return Err(Error::Registration(format!(
                "cannot ban {} after the set '{}' has compiled a template",
                what, self.inner.name
            )));
        }
        Ok(())
    }

    pub fn ban_filter(&self, name: &str) -> Result<(), Error> {
        self.ensure_not_compiled(&format!("filter '{}'", name))?;
        self.update_registry(|r| r.ban_filter(name))
    }

    pub fn ban_tag(&self, name: &str) -> Result<(), Error> {
        self.ensure_not_compiled(&format!("tag '{}'", name))?;
        self.update_registry(|r| r.ban_tag(name))
    }

    pub fn add_global<V: Into<Value>>(&self, name: &str, value: V) {
        let mut guard = write(&self.inner.globals);
        Arc::make_mut(&mut guard).insert(name, value);
    }

    pub fn globals(&self) -> Arc<Context> {
        Arc::clone(&read(&self.inner.globals))
    }

    /// Compile a named in-memory template; the result is not cached
    pub fn compile(&self, name: &str, source: &str) -> Result<Arc<Template>, Error> {
        self.compile_source(name, source, vec![name.to_string()])
    }

    pub fn from_string(&self, source: &str) -> Result<Arc<Template>, Error> {
        self.compile("<string>", source)
    }

    /// Load and compile a template through the loaders, bypassing the cache
    pub fn from_file(&self, name: &str) -> Result<Arc<Template>, Error> {
        let (path, source) = self.open(&self.loaders(), None, name)?;
        self.compile_source(&path, &source, vec![path.clone()])
    }

    /// Load a template through the cache (the cache is skipped in debug mode)
    pub fn from_cache(&self, name: &str) -> Result<Arc<Template>, Error> {
        self.load_at_runtime(None, name)
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, Error> {
        self.from_cache(name)?.execute(context)
    }

    pub fn clear_cache(&self) {
        write(&self.inner.cache).clear();
        tracing::debug!(set = %self.inner.name, "cleared template cache");
    }

    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.cache).keys().cloned().collect();
        names.sort();
        names
    }

    /// The source line an error points at, if its template can still be found
    pub fn raw_line(&self, error: &Error) -> Option<String> {
        let position = error.position()?;
        let name: &str = &position.template;
        if let Some(template) = read(&self.inner.cache).get(name) {
            return template.raw_line(position.line).map(str::to_string);
        }
        self.loaders().iter().find_map(|loader| {
            let source = loader.open(name).ok()?;
            position
                .line
                .checked_sub(1)
                .and_then(|idx| source.lines().nth(idx))
                .map(str::to_string)
        })
    }

    fn open(&self, loaders: &[Arc<dyn Loader>], base: Option<&str>, name: &str) -> Result<(String, String), Error> {
        let mut last_error = None;
        for loader in loaders {
            let path = loader.resolve(base, name);
            match loader.open(&path) {
                Ok(source) => {
                    tracing::debug!(template = %path, "loaded template source");
                    return Ok((path, source));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::loader(name, "no template loader is configured")))
    }

    /// Resolve a template referenced while another one is being compiled
    pub(crate) fn load_for_compile(&self, base: Option<&str>, name: &str, stack: &[String]) -> Result<Resolved, Error> {
        let loaders = self.loaders();
        let use_cache = !self.inner.config.debug;
        if use_cache {
            for loader in &loaders {
                let path = loader.resolve(base, name);
                if let Some(template) = read(&self.inner.cache).get(&path) {
                    tracing::debug!(template = %path, "template cache hit");
                    return Ok(Resolved::Ready(Arc::clone(template)));
                }
            }
        }

        let (path, source) = self.open(&loaders, base, name)?;
        if stack.iter().any(|entry| *entry == path) {
            return Ok(Resolved::InProgress(path));
        }
        let mut stack = stack.to_vec();
        stack.push(path.clone());
        let template = self.compile_source(&path, &source, stack)?;
        if use_cache {
            write(&self.inner.cache).insert(path, Arc::clone(&template));
        }
        Ok(Resolved::Ready(template))
    }

    /// Resolve a template needed during rendering (`include`, dynamic `extends`)
    pub(crate) fn load_at_runtime(&self, base: Option<&str>, name: &str) -> Result<Arc<Template>, Error> {
        match self.load_for_compile(base, name, &[])? {
            Resolved::Ready(template) => Ok(template),
            Resolved::InProgress(path) => Err(Error::loader(path, "template is still being compiled")),
        }
    }

    fn compile_source(&self, name: &str, source: &str, stack: Vec<String>) -> Result<Arc<Template>, Error> {
        self.inner.compiled_any.store(true, Ordering::Release);
        let config = &self.inner.config;
        let registry = self.registry();
        let tokens = Lexer::new(name, source)
            .with_options(config.lexer_options())
            .tokenize()?;

        let mut parser = DocParser::new(name, self, &registry, &tokens, stack);
        let nodes = parser.parse()?;
        let compiled = parser.finish();

        let level = match &compiled.parent {
            Some(Parent::Static(parent)) => parent.level() + 1,
            _ => 0,
        };
        tracing::debug!(template = name, nodes = nodes.len(), level, "compiled template");

        Ok(Arc::new(Template {
            name: Arc::from(name),
            source: source.to_string(),
            tokens,
            nodes,
            parent: compiled.parent,
            blocks: compiled.blocks,
            macros: compiled.macros,
            level,
            options: config.render_options(),
            set: Arc::downgrade(&self.inner),
        }))
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new("default", vec![Arc::new(FileSystemLoader::default())])
    }
}
