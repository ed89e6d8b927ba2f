//! Values produced while evaluating a topology script

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use routeplane_sdk::ProcessorRef;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::predicate::{Operand, Predicate};
use crate::config::ConfigKey;
use crate::engine::registry::Component;

/// A script symbol such as `:control_channel`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl ConfigKey for Symbol {
    fn config_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.0)
    }
}

/// Runtime value of a script expression.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(Symbol),
    List(Vec<Value>),
    /// Insertion-ordered map
    Map(Vec<(String, Value)>),
    /// Reference to a header or the body, awaiting a comparison
    Operand(Operand),
    Predicate(Predicate),
    Processor(ProcessorRef),
    Component(Arc<dyn Component>),
    /// The route builder itself, returned by vocabulary calls so they chain
    Builder,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Operand(_) => "expression",
            Value::Predicate(_) => "predicate",
            Value::Processor(_) => "processor",
            Value::Component(_) => "component",
            Value::Builder => "route builder",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Strings and symbols both name things.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Symbol(sym) => Some(sym.name()),
            _ => None,
        }
    }

    /// Plain data as JSON. Expressions, processors and components have no
    /// JSON form.
    pub fn to_json(&self) -> Option<JsonValue> {
        Some(match self {
            Value::Nil => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number)?,
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Symbol(sym) => JsonValue::String(sym.name().to_string()),
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Map(entries) => {
                let mut map = JsonMap::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json()?);
                }
                JsonValue::Object(map)
            }
            _ => return None,
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Symbol(sym) => write!(f, "{}", sym),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Operand(op) => write!(f, "{}", op),
            Value::Predicate(p) => write!(f, "{}", p),
            Value::Processor(p) => write!(f, "<processor {}>", p.name()),
            Value::Component(c) => write!(f, "<{}>", c.type_name()),
            Value::Builder => f.write_str("<route builder>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
