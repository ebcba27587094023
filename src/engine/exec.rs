//! Tree-walking evaluation of nodes and expressions

use super::ast::{BinaryOp, Expr, FilterCall, Node, Segment, VariablePath};
use super::context::ExecutionContext;
use super::error::Error;
use super::ops;
use super::value::Value;
use std::fmt;
use std::sync::Arc;

impl Node {
    pub fn execute(&self, ctx: &mut ExecutionContext<'_>, out: &mut dyn fmt::Write) -> Result<(), Error> {
        match self {
            Node::Text(text) => {
                out.write_str(text)?;
                Ok(())
            }
            Node::Output(node) => {
                let value = node.expr.evaluate(ctx).map_err(|e| e.located(&node.position))?;
                ctx.write_value(out, &value)
                    .map_err(|e| e.located(&node.position))
            }
            Node::Tag(node) => node
                .statement
                .execute(ctx, out)
                .map_err(|e| e.located(&node.position)),
        }
    }
}

impl Expr {
    pub fn evaluate(&self, ctx: &mut ExecutionContext<'_>) -> Result<Value, Error> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| item.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::from(values))
            }
            Expr::Variable(path) => path.resolve(ctx),
            Expr::Unary { op, operand, position } => {
                let value = operand.evaluate(ctx)?;
                ops::unary(*op, value).map_err(|e| e.located(position))
            }
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
                ..
            } => {
                if !lhs.evaluate(ctx)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(rhs.evaluate(ctx)?.is_truthy()))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
                ..
            } => {
                if lhs.evaluate(ctx)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(rhs.evaluate(ctx)?.is_truthy()))
            }
            Expr::Binary { op, lhs, rhs, position } => {
                let lhs = lhs.evaluate(ctx)?;
                let rhs = rhs.evaluate(ctx)?;
                ops::binary(*op, &lhs, &rhs).map_err(|e| e.located(position))
            }
            Expr::Filtered { expr, filters } => {
                let mut value = expr.evaluate(ctx)?;
                for filter in filters {
                    value = filter.apply(ctx, value)?;
                }
                Ok(value)
            }
        }
    }
}

impl FilterCall {
    pub fn apply(&self, ctx: &mut ExecutionContext<'_>, input: Value) -> Result<Value, Error> {
        let arg = match &self.arg {
            Some(expr) => Some(expr.evaluate(ctx)?),
            None => None,
        };
        (self.func)(&input, arg.as_ref()).map_err(|e| {
            match e {
                Error::Execution {
                    position: None,
                    message,
                    cause,
                } => Error::Execution {
                    position: Some(self.position.clone()),
                    message: format!("filter '{}': {}", self.name, message),
                    cause,
                },
                other => other,
            }
        })
    }
}

impl VariablePath {
    pub fn resolve(&self, ctx: &mut ExecutionContext<'_>) -> Result<Value, Error> {
        self.walk(ctx).map_err(|e| e.located(&self.position))
    }

    fn walk(&self, ctx: &mut ExecutionContext<'_>) -> Result<Value, Error> {
        let mut current = ctx.lookup(&self.name);
        let mut segments = self.segments.iter().peekable();

        loop {
            let next = segments.next();

            // zero-argument callables are invoked when reached without parentheses
            let implicit = match (&current, next) {
                (Value::Func(f), next) if f.min_args() == 0 && !matches!(next, Some(Segment::Call(_))) => {
                    Some(f.clone())
                }
                _ => None,
            };
            if let Some(f) = implicit {
                current = f.call(ctx, &[])?;
            }

            let Some(segment) = next else {
                break;
            };
            if current.is_nil() {
                return Ok(Value::Nil);
            }

            current = match segment {
                Segment::Attr(name) => match (&current, segments.peek()) {
                    (Value::Object(obj), Some(Segment::Call(args))) => {
                        let obj = Arc::clone(obj);
                        let args = evaluate_args(ctx, args)?;
                        segments.next();
                        obj.call_method(name, &args)?
                    }
                    _ => member(&current, name)?,
                },
                Segment::Index(index) => item(&current, *index)?,
                Segment::Subscript(expr) => {
                    let key = expr.evaluate(ctx)?;
                    subscript(&current, &key)?
                }
                Segment::Call(args) => match &current {
                    Value::Func(f) => {
                        let f = f.clone();
                        let args = evaluate_args(ctx, args)?;
                        f.call(ctx, &args)?
                    }
                    other => {
                        return Err(Error::execution(format!(
                            "{} is not callable",
                            other.type_name()
                        )))
                    }
                },
            };
        }
        Ok(current)
    }
}

fn evaluate_args(ctx: &mut ExecutionContext<'_>, args: &[Expr]) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| arg.evaluate(ctx)).collect()
}

fn member(value: &Value, name: &str) -> Result<Value, Error> {
    match value {
        Value::Map(map) => Ok(map.get(name).cloned().unwrap_or_default()),
        Value::Object(obj) => Ok(obj.get_attr(name).unwrap_or_default()),
        other => Err(Error::execution(format!(
            "cannot access member '{}' of {}",
            name,
            other.type_name()
        ))),
    }
}

fn item(value: &Value, index: i64) -> Result<Value, Error> {
    let position = |len: usize| -> Option<usize> {
        let idx = if index < 0 { len as i64 + index } else { index };
        usize::try_from(idx).ok().filter(|i| *i < len)
    };
    match value {
        Value::Seq(items) => Ok(position(items.len())
            .map(|i| items[i].clone())
            .unwrap_or_default()),
        Value::Str(s) | Value::Safe(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(match position(chars.len()) {
                Some(i) if value.is_safe() => Value::safe(chars[i].to_string()),
                Some(i) => Value::from(chars[i].to_string()),
                None => Value::Nil,
            })
        }
        Value::Map(map) => Ok(map.get(&index.to_string()).cloned().unwrap_or_default()),
        Value::Object(obj) => Ok(obj.get_item(&Value::Int(index)).unwrap_or_default()),
        other => Err(Error::execution(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

fn subscript(value: &Value, key: &Value) -> Result<Value, Error> {
    match key {
        Value::Int(index) => item(value, *index),
        Value::Str(name) | Value::Safe(name) => match value {
            Value::Seq(_) => Err(Error::execution(format!(
                "sequence indices must be integers, got '{}'",
                name
            ))),
            _ => member(value, name),
        },
        Value::Nil => Ok(Value::Nil),
        other => Err(Error::execution(format!(
            "cannot subscript with {}",
            other.type_name()
        ))),
    }
}
