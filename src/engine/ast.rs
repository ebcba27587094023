//! Abstract syntax tree
//!
//! Nodes are built once at compile time and shared read-only between renders.

use super::context::ExecutionContext;
use super::error::{Error, Position};
use super::registry::FilterFn;
use super::value::Value;
use std::fmt;
use std::sync::Arc;

/// A statement produced by a tag parser
pub trait Statement: fmt::Debug + Send + Sync {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error>;
}

/// A shared node sequence, used where bodies outlive a single parse
pub type NodeList = Arc<Vec<Node>>;

#[derive(Debug)]
pub enum Node {
    Text(String),
    Output(OutputNode),
    Tag(TagNode),
}

#[derive(Debug)]
pub struct OutputNode {
    pub position: Position,
    pub expr: Expr,
}

#[derive(Debug)]
pub struct TagNode {
    pub name: String,
    pub position: Position,
    pub statement: Box<dyn Statement>,
}

#[derive(Debug)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Variable(VariablePath),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        position: Position,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        position: Position,
    },
    Filtered {
        expr: Box<Expr>,
        filters: Vec<FilterCall>,
    },
}

impl Expr {
    /// The string value of a literal string expression
    pub fn as_literal_str(&self) -> Option<&str> {
        match self {
            Expr::Literal(value) => value.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug)]
pub struct VariablePath {
    pub name: String,
    pub segments: Vec<Segment>,
    pub position: Position,
}

#[derive(Debug)]
pub enum Segment {
    Attr(String),
    Index(i64),
    Subscript(Expr),
    Call(Vec<Expr>),
}

/// A filter resolved against the registry at parse time
pub struct FilterCall {
    pub name: String,
    pub arg: Option<Expr>,
    pub position: Position,
    pub(crate) func: FilterFn,
}

impl fmt::Debug for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterCall")
            .field("name", &self.name)
            .field("arg", &self.arg)
            .finish()
    }
}

/// A `{% macro %}` definition
#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<(String, Option<Expr>)>,
    pub body: Vec<Node>,
    pub exported: bool,
}
