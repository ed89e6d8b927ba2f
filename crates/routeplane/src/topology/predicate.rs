//! Message predicates used by `intercept` and `when`

use std::fmt;

use routeplane_sdk::{Body, Message};
use serde_json::Value as JsonValue;

/// The part of a message a predicate inspects.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Header(String),
    Body,
}

impl Operand {
    /// Resolve against a message. Absent headers and empty bodies are `None`.
    pub fn resolve(&self, message: &Message) -> Option<JsonValue> {
        match self {
            Operand::Header(name) => match message.header(name)? {
                JsonValue::Null => None,
                value => Some(value.clone()),
            },
            Operand::Body => match &message.body {
                Body::Empty | Body::Object(_) => None,
                Body::Json(value) if value.is_null() => None,
                Body::Json(value) => Some(value.clone()),
                other => other.as_text().map(|s| JsonValue::String(s.to_string())),
            },
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Header(name) => write!(f, "header({:?})", name),
            Operand::Body => f.write_str("body()"),
        }
    }
}

/// A boolean test over a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(Operand, JsonValue),
    NotEquals(Operand, JsonValue),
    IsNull(Operand),
    IsNotNull(Operand),
    Contains(Operand, String),
    StartsWith(Operand, String),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Predicate::Equals(op, expected) => op
                .resolve(message)
                .is_some_and(|actual| loosely_equal(&actual, expected)),
            Predicate::NotEquals(op, expected) => !op
                .resolve(message)
                .is_some_and(|actual| loosely_equal(&actual, expected)),
            Predicate::IsNull(op) => op.resolve(message).is_none(),
            Predicate::IsNotNull(op) => op.resolve(message).is_some(),
            Predicate::Contains(op, needle) => op
                .resolve(message)
                .is_some_and(|v| render(&v).contains(needle.as_str())),
            Predicate::StartsWith(op, prefix) => op
                .resolve(message)
                .is_some_and(|v| render(&v).starts_with(prefix.as_str())),
            Predicate::Not(inner) => !inner.matches(message),
            Predicate::And(a, b) => a.matches(message) && b.matches(message),
            Predicate::Or(a, b) => a.matches(message) || b.matches(message),
        }
    }

    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }
}

/// Strings compare case-sensitively; a string and a scalar compare by their
/// rendered form so that header `"3"` equals literal `3`.
fn loosely_equal(actual: &JsonValue, expected: &JsonValue) -> bool {
    actual == expected || render(actual) == render(expected)
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(op, v) => write!(f, "{}.is_equal_to({})", op, v),
            Predicate::NotEquals(op, v) => write!(f, "{}.is_not_equal_to({})", op, v),
            Predicate::IsNull(op) => write!(f, "{}.is_null", op),
            Predicate::IsNotNull(op) => write!(f, "{}.is_not_null", op),
            Predicate::Contains(op, s) => write!(f, "{}.contains({:?})", op, s),
            Predicate::StartsWith(op, s) => write!(f, "{}.starts_with({:?})", op, s),
            Predicate::Not(p) => write!(f, "is_not({})", p),
            Predicate::And(a, b) => write!(f, "({} and {})", a, b),
            Predicate::Or(a, b) => write!(f, "({} or {})", a, b),
        }
    }
}
