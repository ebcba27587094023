//! Template engine core
//!
//! Source text goes through the [`lexer`] into tokens, the [`parser`] turns the
//! tokens into [`ast`] nodes, and the executor walks those nodes against an
//! [`ExecutionContext`]. A [`TemplateSet`] ties compilation, loading and
//! caching together.

pub mod ast;
pub mod context;
pub mod error;
mod exec;
pub mod lexer;
pub mod loader;
mod ops;
pub mod parser;
pub mod registry;
pub mod set;
pub mod template;
pub mod value;

pub use ast::{Expr, MacroDef, Node, NodeList, Statement};
pub use context::{Context, ExecutionContext};
pub use error::{Error, Position};
pub use lexer::{tokenize, Lexer, LexerOptions, Token, TokenKind};
pub use loader::{FileSystemLoader, Loader, MemoryLoader};
pub use parser::{DocParser, Parser, Wrapped};
pub use registry::{FilterFn, Registry, TagParserFn};
pub use set::TemplateSet;
pub use template::{Parent, RenderOptions, Template};
pub use value::{Function, Object, ParamKind, Value};
