//! Filter and tag registries
//!
//! Each [`TemplateSet`](super::set::TemplateSet) owns one registry. Parsers
//! work on an `Arc` snapshot taken when compilation starts, so registering
//! while other templates compile never changes a parse midway.

use super::ast::Statement;
use super::error::Error;
use super::lexer::Token;
use super::parser::{DocParser, Parser};
use super::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type FilterFn = Arc<dyn Fn(&Value, Option<&Value>) -> Result<Value, Error> + Send + Sync>;

pub type TagParserFn = Arc<
    dyn Fn(&mut DocParser<'_>, &Token, &mut Parser<'_>) -> Result<Box<dyn Statement>, Error>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct Registry {
    filters: HashMap<String, FilterFn>,
    tags: HashMap<String, TagParserFn>,
    banned_filters: HashSet<String>,
    banned_tags: HashSet<String>,
}

impl Registry {
    /// A registry holding all built-in tags and filters
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        crate::filters::register_builtins(&mut registry);
        crate::tags::register_builtins(&mut registry);
        registry
    }

    pub(crate) fn insert_filter(&mut self, name: &str, filter: FilterFn) {
        self.filters.insert(name.to_string(), filter);
    }

    pub(crate) fn insert_tag(&mut self, name: &str, tag: TagParserFn) {
        self.tags.insert(name.to_string(), tag);
    }

    pub fn register_filter(&mut self, name: &str, filter: FilterFn) -> Result<(), Error> {
        if self.filters.contains_key(name) {
            return Err(Error::Registration(format!(
                "filter '{}' is already registered",
                name
            )));
        }
        self.insert_filter(name, filter);
        Ok(())
    }

    pub fn replace_filter(&mut self, name: &str, filter: FilterFn) -> Result<(), Error> {
        if !self.filters.contains_key(name) {
            return Err(Error::Registration(format!(
                "cannot replace filter '{}', it does not exist",
                name
            )));
        }
        self.insert_filter(name, filter);
        Ok(())
    }

    pub fn register_tag(&mut self, name: &str, tag: TagParserFn) -> Result<(), Error> {
        if self.tags.contains_key(name) {
            return Err(Error::Registration(format!(
                "tag '{}' is already registered",
                name
            )));
        }
        self.insert_tag(name, tag);
        Ok(())
    }

    pub fn replace_tag(&mut self, name: &str, tag: TagParserFn) -> Result<(), Error> {
        if !self.tags.contains_key(name) {
            return Err(Error::Registration(format!(
                "cannot replace tag '{}', it does not exist",
                name
            )));
        }
        self.insert_tag(name, tag);
        Ok(())
    }

    pub fn ban_filter(&mut self, name: &str) -> Result<(), Error> {
        if !self.filters.contains_key(name) {
            return Err(Error::Registration(format!(
                "cannot ban unknown filter '{}'",
                name
            )));
        }
        if !self.banned_filters.insert(name.to_string()) {
            return Err(Error::Registration(format!(
                "filter '{}' is already banned",
                name
            )));
        }
        Ok(())
    }

    pub fn ban_tag(&mut self, name: &str) -> Result<(), Error> {
        if !self.tags.contains_key(name) {
            return Err(Error::Registration(format!(
                "cannot ban unknown tag '{}'",
                name
            )));
        }
        if !self.banned_tags.insert(name.to_string()) {
            return Err(Error::Registration(format!("tag '{}' is already banned", name)));
        }
        Ok(())
    }

    pub fn filter(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn tag(&self, name: &str) -> Option<&TagParserFn> {
        self.tags.get(name)
    }

    pub fn is_filter_banned(&self, name: &str) -> bool {
        self.banned_filters.contains(name)
    }

    pub fn is_tag_banned(&self, name: &str) -> bool {
        self.banned_tags.contains(name)
    }

    pub fn filter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
