//! Runtime values
//!
//! Everything a template can see is a [`Value`]. Host data comes in either as
//! plain values (usually through serde), as an [`Object`] implementation for
//! records with computed members, or as a [`Function`].

use super::context::ExecutionContext;
use super::error::Error;
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// A string that is written out without autoescaping
    Safe(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<IndexMap<String, Value>>),
    Object(Arc<dyn Object>),
    Func(Function),
}

/// A host record exposed to templates
pub trait Object: fmt::Debug + Send + Sync {
    /// Member access, `obj.name`
    fn get_attr(&self, name: &str) -> Option<Value>;

    /// Index access, `obj.0` or `obj[key]` with an integer key
    fn get_item(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Method call, `obj.name(args)`
    fn call_method(&self, name: &str, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::execution(format!(
            "{} has no method '{}'",
            self.type_name(),
            name
        )))
    }

    fn type_name(&self) -> &str {
        "object"
    }

    /// Items visited by `for`; `None` means the object is not iterable
    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// Parameter kinds a [`Function`] can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    Bool,
    Int,
    Float,
    Number,
    String,
    Seq,
    Map,
}

impl ParamKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::Bool => matches!(value, Value::Bool(_)),
            ParamKind::Int => matches!(value, Value::Int(_)),
            ParamKind::Float => matches!(value, Value::Float(_)),
            ParamKind::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            ParamKind::String => value.as_str().is_some(),
            ParamKind::Seq => matches!(value, Value::Seq(_)),
            ParamKind::Map => matches!(value, Value::Map(_)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ParamKind::Any => "any value",
            ParamKind::Bool => "bool",
            ParamKind::Int => "integer",
            ParamKind::Float => "float",
            ParamKind::Number => "number",
            ParamKind::String => "string",
            ParamKind::Seq => "sequence",
            ParamKind::Map => "mapping",
        }
    }
}

type PlainFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;
type ContextFn = dyn Fn(&mut ExecutionContext<'_>, &[Value]) -> Result<Value, Error> + Send + Sync;

#[derive(Clone)]
enum Callback {
    Plain(Arc<PlainFn>),
    WithContext(Arc<ContextFn>),
}

/// A callable value with a declared signature
///
/// Arguments are checked against the signature before the callback runs.
/// A function declaring no required parameters is invoked implicitly when a
/// template reaches it without parentheses.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    params: Vec<ParamKind>,
    optional: usize,
    variadic: Option<ParamKind>,
    callback: Callback,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::build(name, Callback::Plain(Arc::new(f)))
    }

    /// A function that receives the current execution context
    pub fn with_context<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::build(name, Callback::WithContext(Arc::new(f)))
    }

    fn build(name: &str, callback: Callback) -> Self {
        Self {
            name: Arc::from(name),
            params: Vec::new(),
            optional: 0,
            variadic: None,
            callback,
        }
    }

    /// Append a required positional parameter
    pub fn param(mut self, kind: ParamKind) -> Self {
        self.params.push(kind);
        self
    }

    /// Append a positional parameter that may be left out
    pub fn optional(mut self, kind: ParamKind) -> Self {
        self.params.push(kind);
        self.optional += 1;
        self
    }

    /// Accept any number of extra arguments of `kind`
    pub fn variadic(mut self, kind: ParamKind) -> Self {
        self.variadic = Some(kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.params.len() - self.optional
    }

    pub fn max_args(&self) -> Option<usize> {
        match self.variadic {
            Some(_) => None,
            None => Some(self.params.len()),
        }
    }

    fn check_args(&self, args: &[Value]) -> Result<(), Error> {
        if args.len() < self.min_args() {
            return Err(Error::execution(format!(
                "function '{}' expects at least {} argument(s), got {}",
                self.name,
                self.min_args(),
                args.len()
            )));
        }
        if let Some(max) = self.max_args() {
            if args.len() > max {
                return Err(Error::execution(format!(
                    "function '{}' expects at most {} argument(s), got {}",
                    self.name,
                    max,
                    args.len()
                )));
            }
        }
        for (i, arg) in args.iter().enumerate() {
            let kind = match self.params.get(i) {
                Some(kind) => *kind,
                None => self.variadic.unwrap_or(ParamKind::Any),
            };
            if !kind.accepts(arg) {
                return Err(Error::execution(format!(
                    "argument {} of function '{}' must be {}, got {}",
                    i + 1,
                    self.name,
                    kind.name(),
                    arg.type_name()
                )));
            }
        }
        Ok(())
    }

    pub fn call(&self, ctx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Value, Error> {
        self.check_args(args)?;
        match &self.callback {
            Callback::Plain(f) => f(args),
            Callback::WithContext(f) => f(ctx, args),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

impl Value {
    pub fn safe(s: impl Into<Arc<str>>) -> Self {
        Value::Safe(s.into())
    }

    /// Convert any serializable host value
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let json = serde_json::to_value(value)
            .map_err(|e| Error::execution(format!("cannot convert value: {}", e)))?;
        Ok(Self::from_json(json))
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::from(items.into_iter().map(Value::from_json).collect::<Vec<_>>())
            }
            serde_json::Value::Object(map) => Value::from(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil | Value::Func(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) | Value::Safe(s) => serde_json::Value::String(s.to_string()),
            Value::Seq(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Object(obj) => serde_json::Value::String(obj.render()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) | Value::Safe(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Object(obj) => obj.type_name(),
            Value::Func(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Value::Safe(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Safe(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(obj) => obj.len().map(|n| n > 0).unwrap_or(true),
            Value::Func(_) => true,
        }
    }

    /// Mark the value safe; non-strings are converted to their display form
    pub fn into_safe(self) -> Value {
        match self {
            Value::Safe(_) => self,
            Value::Str(s) => Value::Safe(s),
            other => Value::Safe(Arc::from(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Lenient integer conversion used by filters
    pub fn to_integer(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::Str(s) | Value::Safe(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Lenient float conversion used by filters
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) | Value::Safe(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) | Value::Safe(s) => Some(s.chars().count()),
            Value::Seq(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            Value::Object(obj) => obj.len(),
            _ => None,
        }
    }

    /// Items visited by a single-variable `for`, `None` if not iterable
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::Seq(items) => Some(items.as_ref().clone()),
            Value::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Some(keys.into_iter().map(|k| Value::from(k.as_str())).collect())
            }
            Value::Str(s) | Value::Safe(s) => {
                Some(s.chars().map(|c| Value::from(c.to_string())).collect())
            }
            Value::Object(obj) => obj.iterate(),
            _ => None,
        }
    }

    /// Membership test backing the `in` operator
    pub fn contains(&self, needle: &Value) -> Result<bool, Error> {
        match self {
            Value::Str(s) | Value::Safe(s) => Ok(s.contains(needle.to_string().as_str())),
            Value::Seq(items) => Ok(items.iter().any(|item| item.equals(needle))),
            Value::Map(map) => Ok(map.contains_key(needle.to_string().as_str())),
            Value::Object(obj) => Ok(match needle.as_str() {
                Some(name) => obj.get_attr(name).is_some(),
                None => obj.get_item(needle).is_some(),
            }),
            Value::Nil => Ok(false),
            other => Err(Error::execution(format!(
                "'in' is not supported on {}",
                other.type_name()
            ))),
        }
    }

    /// Equality as seen by `==`; containers and objects never compare equal
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Ordering for `< <= > >=`, `None` when the values are not comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) | Value::Safe(s) => write!(f, "{}", s),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "{}", obj.render()),
            Value::Func(func) => write!(f, "<function {}>", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Safe(s) => write!(f, "Safe({:?})", s),
            Value::Seq(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Object(obj) => write!(f, "Object({:?})", obj),
            Value::Func(func) => write!(f, "{:?}", func),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        let mut entries: Vec<(String, T)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Map(Arc::new(
            entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
        ))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Func(f)
    }
}

impl<T: Object + 'static> From<Arc<T>> for Value {
    fn from(obj: Arc<T>) -> Self {
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::from(true).to_string(), "True");
        assert_eq!(Value::from(8.0).to_string(), "8");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(Vec::<Value>::new()).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(0.5).is_truthy());
    }

    #[test]
    fn test_equality_promotes_numbers() {
        assert!(Value::from(1).equals(&Value::from(1.0)));
        assert!(Value::from("a").equals(&Value::safe("a")));
        assert!(!Value::from(1).equals(&Value::from("1")));
    }

    #[test]
    fn test_containers_never_equal() {
        let a = Value::from(vec![1]);
        assert!(!a.equals(&a.clone()));
        let m = Value::from(IndexMap::new());
        assert!(!m.equals(&m.clone()));
    }

    #[test]
    fn test_from_json_keeps_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null, 1.5]});
        let value = Value::from_json(json);
        assert_eq!(value.to_string(), "{b: 1, a: [True, , 1.5]}");
    }

    #[test]
    fn test_contains() {
        let list = Value::from(vec!["a", "b"]);
        assert!(list.contains(&Value::from("a")).unwrap());
        assert!(Value::from("hello").contains(&Value::from("ell")).unwrap());
        assert!(Value::from(3).contains(&Value::from(3)).is_err());
    }

    #[derive(Debug)]
    struct Point {
        x: i64,
    }

    impl Object for Point {
        fn get_attr(&self, name: &str) -> Option<Value> {
            match name {
                "x" => Some(Value::from(self.x)),
                _ => None,
            }
        }

        fn type_name(&self) -> &str {
            "Point"
        }
    }

    #[test]
    fn test_object_defaults() {
        let value = Value::from(Arc::new(Point { x: 3 }));
        assert_eq!(value.type_name(), "Point");
        assert_eq!(value.to_string(), "<Point>");
        assert!(value.contains(&Value::from("x")).unwrap());
        assert!(value.is_truthy());
    }
}
