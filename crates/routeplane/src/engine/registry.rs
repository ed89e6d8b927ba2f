//! Engine component registry
//!
//! Components are named objects the engine resolves by key: processors
//! referenced with `process_ref`, beans returned by `lookup`, and anything a
//! registry-lookup capability hands back to a script. Properties are set
//! through [`Component::set_property`], which is how named arguments of a
//! capability call reach the looked-up object.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use routeplane_sdk::{Exchange, ProcessError, Processor, ProcessorRef};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised by property setters
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("{type_name} has no property `{property}`")]
    Unsupported { type_name: String, property: String },

    #[error("Invalid value for {property}: {message}")]
    InvalidValue { property: String, message: String },
}

/// A named object held by the engine.
pub trait Component: Send + Sync + fmt::Debug {
    /// Type name used in error messages.
    fn type_name(&self) -> &str;

    /// Apply several property setters as one update: either every value is
    /// written or, on error, none is.
    fn set_properties(&self, values: Vec<(String, JsonValue)>) -> Result<(), PropertyError>;

    /// Apply a single property setter.
    fn set_property(&self, name: &str, value: JsonValue) -> Result<(), PropertyError> {
        self.set_properties(vec![(name.to_string(), value)])
    }

    /// Read a property back.
    fn property(&self, _name: &str) -> Option<JsonValue> {
        None
    }

    /// View this component as a processor, if it is one.
    fn as_processor(self: Arc<Self>) -> Option<ProcessorRef> {
        None
    }
}

/// Read side of a component registry.
pub trait ComponentRegistry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<Arc<dyn Component>>;
}

/// Concurrent component registry backed by a `DashMap`.
#[derive(Default)]
pub struct Registry {
    components: DashMap<String, Arc<dyn Component>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a component under `key`, returning the one it replaced.
    pub fn register(
        &self,
        key: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Option<Arc<dyn Component>> {
        let key = key.into();
        tracing::debug!(key = %key, type_name = component.type_name(), "Registered component");
        self.components.insert(key, component)
    }

    /// Bind a processor under `key`.
    pub fn register_processor(&self, key: impl Into<String>, processor: ProcessorRef) {
        let key = key.into();
        let component = ProcessorComponent::new(key.clone(), processor);
        self.register(key, Arc::new(component));
    }

    pub fn remove(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.components.remove(key).map(|(_, c)| c)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.components.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.components.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentRegistry for Registry {
    fn lookup(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.components.get(key).map(|entry| Arc::clone(entry.value()))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

/// A plain property bag with a fixed set of settable properties.
///
/// # Example
///
/// ```ignore
/// let mailer = Bean::new("Mailer").with_property("host", json!("localhost"));
/// mailer.set_property("host", json!("smtp.internal"))?;
/// ```
#[derive(Debug)]
pub struct Bean {
    type_name: String,
    properties: RwLock<HashMap<String, JsonValue>>,
}

impl Bean {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: RwLock::new(HashMap::new()),
        }
    }

    /// Declare a settable property with its initial value.
    pub fn with_property(self, name: impl Into<String>, initial: JsonValue) -> Self {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), initial);
        self
    }
}

impl Component for Bean {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn set_properties(&self, values: Vec<(String, JsonValue)>) -> Result<(), PropertyError> {
        let mut props = self.properties.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((name, _)) = values.iter().find(|(name, _)| !props.contains_key(name)) {
            return Err(PropertyError::Unsupported {
                type_name: self.type_name.clone(),
                property: name.clone(),
            });
        }
        props.extend(values);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<JsonValue> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Registry entry wrapping a processor. Exposes no properties.
pub struct ProcessorComponent {
    name: String,
    processor: ProcessorRef,
}

impl ProcessorComponent {
    pub fn new(name: impl Into<String>, processor: ProcessorRef) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }
}

impl fmt::Debug for ProcessorComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorComponent")
            .field("name", &self.name)
            .field("processor", &self.processor.name())
            .finish()
    }
}

impl Component for ProcessorComponent {
    fn type_name(&self) -> &str {
        "Processor"
    }

    fn set_properties(&self, values: Vec<(String, JsonValue)>) -> Result<(), PropertyError> {
        match values.into_iter().next() {
            Some((name, _)) => Err(PropertyError::Unsupported {
                type_name: format!("Processor({})", self.name),
                property: name,
            }),
            None => Ok(()),
        }
    }

    fn as_processor(self: Arc<Self>) -> Option<ProcessorRef> {
        Some(Arc::clone(&self.processor))
    }
}

impl Processor for ProcessorComponent {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError> {
        self.processor.process(exchange)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
