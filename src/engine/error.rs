//! Error types shared by the lexer, parsers, executor and loaders

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Location of a token inside a template (1-based, columns count chars)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub template: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(template: &str, line: usize, column: usize) -> Self {
        Self {
            template: Arc::from(template),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} line {}, column {}", self.template, self.line, self.column)
    }
}

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Template compilation and rendering errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("[lex error] {position}: {message}")]
    Lex { position: Position, message: String },

    #[error("[parse error] {position}: {message}")]
    Parse {
        position: Position,
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("{}", execution_message(.position, .message))]
    Execution {
        position: Option<Position>,
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("cannot load template '{name}': {message}")]
    Loader { name: String, message: String },

    #[error("registration error: {0}")]
    Registration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write template output")]
    Write(#[from] fmt::Error),
}

fn execution_message(position: &Option<Position>, message: &str) -> String {
    match position {
        Some(position) => format!("[execution error] {}: {}", position, message),
        None => format!("[execution error] {}", message),
    }
}

impl Error {
    pub fn lex(position: Position, message: impl Into<String>) -> Self {
        Error::Lex {
            position,
            message: message.into(),
        }
    }

    pub fn parse(position: Position, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
            cause: None,
        }
    }

    /// An execution error whose position is filled in by the enclosing node
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            position: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn loader(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Loader {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Attach an underlying cause to a parse or execution error
    pub fn with_cause<E>(mut self, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match &mut self {
            Error::Parse { cause, .. } | Error::Execution { cause, .. } => {
                *cause = Some(Box::new(error));
            }
            _ => {}
        }
        self
    }

    /// Fill in the position of an execution error if it does not have one yet
    pub fn located(self, at: &Position) -> Self {
        match self {
            Error::Execution {
                position: None,
                message,
                cause,
            } => Error::Execution {
                position: Some(at.clone()),
                message,
                cause,
            },
            other => other,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Error::Lex { position, .. } | Error::Parse { position, .. } => Some(position),
            Error::Execution { position, .. } => position.as_ref(),
            _ => None,
        }
    }

    /// The bare message without the location prefix
    pub fn message(&self) -> String {
        match self {
            Error::Lex { message, .. }
            | Error::Parse { message, .. }
            | Error::Execution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_loader_error(&self) -> bool {
        matches!(self, Error::Loader { .. })
    }
}
