//! Capability registry
//!
//! A capability is a name a topology script can call as if it were part of
//! the vocabulary. Each name maps to one [`Binding`]:
//!
//! - [`Binding::RegistryLookup`] resolves a key in the engine's component
//!   registry. It accepts no arguments, or exactly one structured argument
//!   (named fields or a single map) whose entries are applied as property
//!   setters on the looked-up component.
//! - [`Binding::InlineHandler`] calls a host closure with whatever arguments
//!   were supplied.
//! - [`Binding::Constructor`] builds a new component from a registered type.
//!
//! Registries are owned by a topology session, never global, so two sessions
//! can bind the same name to different things.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::script;
use super::value::Value;
use crate::engine::registry::{Component, ComponentRegistry, PropertyError};

/// Errors raised when registering or invoking capabilities
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("`{name}` called with the wrong arguments: {reason}")]
    Arity { name: String, reason: String },

    #[error("`{name}`: {type_name} has no property `{property}`")]
    UnsupportedProperty {
        name: String,
        type_name: String,
        property: String,
    },

    #[error("`{name}`: invalid value for property `{property}`: {message}")]
    InvalidProperty {
        name: String,
        property: String,
        message: String,
    },

    #[error("Invalid plugin `{name}`: {reason}")]
    InvalidPlugin { name: String, reason: String },

    #[error("`{0}` is a reserved name")]
    ReservedName(String),

    #[error("`{name}`: nothing registered under `{key}`")]
    UnresolvedLookup { name: String, key: String },

    #[error("Unknown capability `{0}`")]
    UnknownCapability(String),

    #[error("`{name}` failed: {message}")]
    Handler { name: String, message: String },
}

impl CapabilityError {
    pub fn handler(name: &str, message: impl fmt::Display) -> Self {
        CapabilityError::Handler {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Arguments of a capability call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn named(fields: Vec<(String, Value)>) -> Self {
        Self {
            positional: Vec::new(),
            named: fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

pub type InlineHandler = Arc<dyn Fn(&Args) -> Result<Value, CapabilityError> + Send + Sync>;

pub type Constructor =
    Arc<dyn Fn(&Args) -> Result<Arc<dyn Component>, CapabilityError> + Send + Sync>;

/// What a capability name resolves to.
#[derive(Clone)]
pub enum Binding {
    RegistryLookup(String),
    InlineHandler(InlineHandler),
    Constructor {
        type_name: String,
        constructor: Constructor,
    },
}

/// Accepted argument shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No arguments, or one structured argument of named fields
    ZeroOrStructured,
    /// Anything; the target validates its own arguments
    Variadic,
}

impl Binding {
    pub fn arity(&self) -> Arity {
        match self {
            Binding::RegistryLookup(_) => Arity::ZeroOrStructured,
            Binding::InlineHandler(_) | Binding::Constructor { .. } => Arity::Variadic,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::RegistryLookup(key) => write!(f, "RegistryLookup({})", key),
            Binding::InlineHandler(_) => f.write_str("InlineHandler"),
            Binding::Constructor { type_name, .. } => write!(f, "Constructor({})", type_name),
        }
    }
}

/// Who registered a capability. Host registrations survive session resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Host,
    Script,
}

/// A registered capability.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub binding: Binding,
    pub origin: Origin,
}

impl Capability {
    pub fn invoke(
        &self,
        args: &Args,
        components: &dyn ComponentRegistry,
    ) -> Result<Value, CapabilityError> {
        match &self.binding {
            Binding::RegistryLookup(key) => self.invoke_lookup(key, args, components),
            Binding::InlineHandler(handler) => handler(args),
            Binding::Constructor { constructor, .. } => constructor(args).map(Value::Component),
        }
    }

    fn invoke_lookup(
        &self,
        key: &str,
        args: &Args,
        components: &dyn ComponentRegistry,
    ) -> Result<Value, CapabilityError> {
        let properties = self.structured_argument(args)?;
        let found = components.lookup(key);
        tracing::trace!(capability = %self.name, key, found = found.is_some(), "Registry lookup");

        if properties.is_empty() {
            return Ok(found.map(Value::Component).unwrap_or(Value::Nil));
        }

        let component = found.ok_or_else(|| CapabilityError::UnresolvedLookup {
            name: self.name.clone(),
            key: key.to_string(),
        })?;

        let mut values = Vec::with_capacity(properties.len());
        for (property, value) in properties {
            let json = value.to_json().ok_or_else(|| CapabilityError::InvalidProperty {
                name: self.name.clone(),
                property: property.clone(),
                message: format!("a {} cannot be assigned to a property", value.kind()),
            })?;
            values.push((property, json));
        }
        component.set_properties(values).map_err(|e| match e {
            PropertyError::Unsupported { type_name, property } => {
                CapabilityError::UnsupportedProperty {
                    name: self.name.clone(),
                    type_name,
                    property,
                }
            }
            PropertyError::InvalidValue { property, message } => CapabilityError::InvalidProperty {
                name: self.name.clone(),
                property,
                message,
            },
        })?;
        Ok(Value::Component(component))
    }

    /// Normalize the call to a list of named fields, enforcing the
    /// zero-or-one-structured-argument shape.
    fn structured_argument(&self, args: &Args) -> Result<Vec<(String, Value)>, CapabilityError> {
        let arity = |reason: String| CapabilityError::Arity {
            name: self.name.clone(),
            reason,
        };

        match (args.positional.as_slice(), args.named.is_empty()) {
            ([], _) => Ok(args.named.clone()),
            ([Value::Map(entries)], true) => Ok(entries.clone()),
            ([single], true) => Err(arity(format!(
                "a positional {} is not a set of named fields",
                single.kind()
            ))),
            (many, true) => Err(arity(format!(
                "expected at most one structured argument, got {} positional",
                many.len()
            ))),
            (_, false) => Err(arity(
                "positional and named arguments cannot be mixed".to_string(),
            )),
        }
    }
}

/// A type that `register_type` can bind. A type without a constructor
/// cannot be bound.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    constructor: Option<Constructor>,
}

impl TypeDescriptor {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Args) -> Result<Arc<dyn Component>, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constructor: Some(Arc::new(constructor)),
        }
    }

    /// Describe a type that exposes no public constructor.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

/// Types known to a session, addressable by name from scripts.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeCatalog {
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }
}

/// Name to binding map for one topology session.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a lookup of `key` in the component registry.
    pub fn register_lookup(
        &mut self,
        name: &str,
        key: &str,
        origin: Origin,
    ) -> Result<(), CapabilityError> {
        self.insert(name, Binding::RegistryLookup(key.to_string()), origin)
    }

    /// Bind `name` to a host closure. Arguments are passed through unchecked.
    pub fn register_inline<F>(
        &mut self,
        name: &str,
        handler: F,
        origin: Origin,
    ) -> Result<(), CapabilityError>
    where
        F: Fn(&Args) -> Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.insert(name, Binding::InlineHandler(Arc::new(handler)), origin)
    }

    /// Bind `name` to construction of `descriptor`.
    pub fn register_type(
        &mut self,
        name: &str,
        descriptor: Option<&TypeDescriptor>,
        origin: Origin,
    ) -> Result<(), CapabilityError> {
        let descriptor = descriptor.ok_or_else(|| CapabilityError::InvalidPlugin {
            name: name.to_string(),
            reason: "no type supplied".to_string(),
        })?;
        let constructor =
            descriptor
                .constructor
                .clone()
                .ok_or_else(|| CapabilityError::InvalidPlugin {
                    name: name.to_string(),
                    reason: format!("{} has no public constructor", descriptor.name),
                })?;
        self.insert(
            name,
            Binding::Constructor {
                type_name: descriptor.name.clone(),
                constructor,
            },
            origin,
        )
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invoke(
        &self,
        name: &str,
        args: &Args,
        components: &dyn ComponentRegistry,
    ) -> Result<Value, CapabilityError> {
        self.get(name)
            .ok_or_else(|| CapabilityError::UnknownCapability(name.to_string()))?
            .invoke(args, components)
    }

    /// Drop every capability registered with `origin`, returning how many
    /// were removed.
    pub fn remove_by_origin(&mut self, origin: Origin) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cap| cap.origin != origin);
        before - self.entries.len()
    }

    fn insert(&mut self, name: &str, binding: Binding, origin: Origin) -> Result<(), CapabilityError> {
        if name.is_empty() || !script::is_identifier(name) {
            return Err(CapabilityError::InvalidPlugin {
                name: name.to_string(),
                reason: "not a valid identifier".to_string(),
            });
        }
        if script::is_reserved(name) {
            return Err(CapabilityError::ReservedName(name.to_string()));
        }

        tracing::debug!(capability = name, binding = ?binding, origin = ?origin, "Registered capability");
        let replaced = self.entries.insert(
            name.to_string(),
            Capability {
                name: name.to_string(),
                binding,
                origin,
            },
        );
        if replaced.is_some() {
            tracing::info!(capability = name, "Capability rebound");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::{Bean, Registry};
    use crate::topology::value::Symbol;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Component registry that counts lookups per key.
    #[derive(Default)]
    struct CountingRegistry {
        inner: Registry,
        lookups: AtomicUsize,
    }

    impl ComponentRegistry for CountingRegistry {
        fn lookup(&self, key: &str) -> Option<Arc<dyn Component>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(key)
        }
    }

    fn with_bean() -> CountingRegistry {
        let registry = CountingRegistry::default();
        registry.inner.register(
            "beanId",
            Arc::new(Bean::new("Mailer").with_property("host", json!("localhost"))),
        );
        registry
    }

    #[test]
    fn test_lookup_without_arguments_performs_one_lookup() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let value = caps.invoke("svc", &Args::new(), &components).unwrap();
        assert!(matches!(value, Value::Component(ref c) if c.type_name() == "Mailer"));
        assert_eq!(components.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_applies_named_fields() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let args = Args::named(vec![("host".to_string(), Value::from("smtp.internal"))]);
        match caps.invoke("svc", &args, &components).unwrap() {
            Value::Component(c) => assert_eq!(c.property("host"), Some(json!("smtp.internal"))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lookup_accepts_single_map_argument() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let args = Args::positional(vec![Value::Map(vec![(
            "host".to_string(),
            Value::from("relay"),
        )])]);
        assert!(caps.invoke("svc", &args, &components).is_ok());
    }

    #[test]
    fn test_lookup_rejects_unsupported_property() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let args = Args::named(vec![("foo".to_string(), Value::from("x"))]);
        let err = caps.invoke("svc", &args, &components).unwrap_err();
        assert!(matches!(err, CapabilityError::UnsupportedProperty { ref property, .. } if property == "foo"));
    }

    #[test]
    fn test_rejected_property_leaves_component_unchanged() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let args = Args::named(vec![
            ("host".to_string(), Value::from("changed")),
            ("foo".to_string(), Value::from("x")),
        ]);
        let err = caps.invoke("svc", &args, &components).unwrap_err();
        assert!(matches!(err, CapabilityError::UnsupportedProperty { ref property, .. } if property == "foo"));

        let bean = components.inner.lookup("beanId").unwrap();
        assert_eq!(bean.property("host"), Some(json!("localhost")));
    }

    #[test]
    fn test_lookup_rejects_positional_arguments() {
        let components = with_bean();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "beanId", Origin::Script).unwrap();

        let single = Args::positional(vec![Value::Symbol(Symbol::new("positional"))]);
        assert!(matches!(
            caps.invoke("svc", &single, &components),
            Err(CapabilityError::Arity { .. })
        ));

        let many = Args::positional(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(
            caps.invoke("svc", &many, &components),
            Err(CapabilityError::Arity { .. })
        ));

        let mixed = Args {
            positional: vec![Value::Map(vec![])],
            named: vec![("host".to_string(), Value::from("x"))],
        };
        assert!(matches!(
            caps.invoke("svc", &mixed, &components),
            Err(CapabilityError::Arity { .. })
        ));
        // shape is checked before the registry is consulted
        assert_eq!(components.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_of_absent_key() {
        let components = CountingRegistry::default();
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("svc", "missing", Origin::Script).unwrap();

        assert!(caps.invoke("svc", &Args::new(), &components).unwrap().is_nil());
        let args = Args::named(vec![("host".to_string(), Value::from("x"))]);
        assert!(matches!(
            caps.invoke("svc", &args, &components),
            Err(CapabilityError::UnresolvedLookup { .. })
        ));
    }

    #[test]
    fn test_inline_handler_receives_arguments_unchecked() {
        let mut caps = CapabilityRegistry::new();
        caps.register_inline(
            "count_args",
            |args: &Args| Ok(Value::Int((args.positional.len() + args.named.len()) as i64)),
            Origin::Host,
        )
        .unwrap();

        let args = Args {
            positional: vec![Value::Int(1), Value::from("a")],
            named: vec![("k".to_string(), Value::Nil)],
        };
        let value = caps.invoke("count_args", &args, &Registry::new()).unwrap();
        assert!(matches!(value, Value::Int(3)));
    }

    #[test]
    fn test_register_type_requires_constructor() {
        let mut caps = CapabilityRegistry::new();
        assert!(matches!(
            caps.register_type("mailer", None, Origin::Host),
            Err(CapabilityError::InvalidPlugin { .. })
        ));
        assert!(matches!(
            caps.register_type("mailer", Some(&TypeDescriptor::opaque("Mailer")), Origin::Host),
            Err(CapabilityError::InvalidPlugin { .. })
        ));

        let ty = TypeDescriptor::new("Mailer", |_args: &Args| {
            Ok(Arc::new(Bean::new("Mailer")) as Arc<dyn Component>)
        });
        caps.register_type("mailer", Some(&ty), Origin::Host).unwrap();
        let value = caps.invoke("mailer", &Args::new(), &Registry::new()).unwrap();
        assert!(matches!(value, Value::Component(ref c) if c.type_name() == "Mailer"));
    }

    #[test]
    fn test_reserved_and_invalid_names() {
        let mut caps = CapabilityRegistry::new();
        assert!(matches!(
            caps.register_lookup("from", "x", Origin::Script),
            Err(CapabilityError::ReservedName(_))
        ));
        assert!(matches!(
            caps.register_lookup("not a name", "x", Origin::Script),
            Err(CapabilityError::InvalidPlugin { .. })
        ));
    }

    #[test]
    fn test_remove_by_origin_keeps_host_entries() {
        let mut caps = CapabilityRegistry::new();
        caps.register_lookup("host_svc", "a", Origin::Host).unwrap();
        caps.register_lookup("script_svc", "b", Origin::Script).unwrap();

        assert_eq!(caps.remove_by_origin(Origin::Script), 1);
        assert_eq!(caps.names(), vec!["host_svc"]);
    }

    #[test]
    fn test_registries_are_independent() {
        let components = with_bean();
        let mut first = CapabilityRegistry::new();
        let mut second = CapabilityRegistry::new();
        first.register_lookup("svc", "beanId", Origin::Script).unwrap();
        second
            .register_inline("svc", |_: &Args| Ok(Value::from("inline")), Origin::Script)
            .unwrap();

        assert!(matches!(first.invoke("svc", &Args::new(), &components).unwrap(), Value::Component(_)));
        assert!(matches!(second.invoke("svc", &Args::new(), &components).unwrap(), Value::Str(ref s) if s == "inline"));
    }
}
