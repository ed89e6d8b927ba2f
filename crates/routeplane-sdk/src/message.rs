//! Message representation carried through topologies

use crate::error::ProcessError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Message payload.
///
/// Text and bytes cover what transports deliver. `Object` carries an
/// in-process value (for example a route definition pushed onto the control
/// channel) and is never serialized.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Body {
    /// No payload
    #[default]
    Empty,

    /// UTF-8 text
    Text(String),

    /// Raw bytes
    Bytes(Bytes),

    /// Structured JSON
    Json(Value),

    /// In-process object
    #[serde(skip)]
    Object(Arc<dyn Any + Send + Sync>),
}

impl Body {
    /// Wrap an in-process value.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Body::Object(Arc::new(value))
    }

    /// Check whether the body carries nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
            Body::Json(v) => v.is_null(),
            Body::Object(_) => false,
        }
    }

    /// View the body as text, if it is text or valid UTF-8 bytes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s.as_str()),
            Body::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Downcast an object body to a concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Body::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short description used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
            Body::Json(_) => "json",
            Body::Object(_) => "object",
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Body::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

/// A message: headers plus a body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// Message headers
    #[serde(default)]
    pub headers: HashMap<String, Value>,

    /// Message body
    #[serde(default)]
    pub body: Body,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message with the given body.
    pub fn with_body(body: impl Into<Body>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header (builder pattern).
    ///
    /// # Example
    /// ```ignore
    /// let msg = Message::with_body("route { from(\"direct:a\").to(\"mock:b\") }")
    ///     .header_value("signal", "configure");
    /// ```
    pub fn header_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set a header, replacing any previous value under the same name.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Get a header value (case-insensitive lookup).
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key).or_else(|| {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Get a header rendered as a string.
    ///
    /// String headers are returned as-is, other JSON values use their
    /// compact representation. `null` counts as absent.
    pub fn header_str(&self, key: &str) -> Option<String> {
        match self.header(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Get a required header.
    pub fn require_header(&self, key: &str) -> Result<&Value, ProcessError> {
        self.header(key)
            .ok_or_else(|| ProcessError::MissingHeader(key.to_string()))
    }

    /// Remove a header, returning its value.
    pub fn remove_header(&mut self, key: &str) -> Option<Value> {
        self.headers.remove(key)
    }

    /// Get the body as text.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_text()
    }
}
