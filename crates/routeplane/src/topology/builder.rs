//! Route definition builder
//!
//! Wraps a topology block (a parsed script block or a native closure) and
//! turns it into a [`RouteDefinition`] on [`configure`]. The builder owns no
//! vocabulary of its own: it hands a fresh engine-native
//! [`DefinitionBuilder`] to the block and forwards to it.
//!
//! A script block keeps the capability scope that was live when its script
//! was configured, so a session reset after the fact does not change what
//! the block can call.
//!
//! [`configure`]: RouteDefinitionBuilder::configure

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use routeplane_sdk::{Exchange, ProcessError, Processor, ProcessorRef};
use serde_json::Value as JsonValue;

use super::configurator::{CapabilityScope, RouteConfigurator};
use super::definition::{DefinitionBuilder, RouteDefinition};
use super::error::TopologyError;
use super::script::eval::RouteBlock;
use crate::engine::registry::{Component, ComponentRegistry};

/// Host closure used as a topology block.
pub type NativeBlock = Arc<
    dyn Fn(&RouteDefinitionBuilder, &mut DefinitionBuilder) -> Result<(), TopologyError>
        + Send
        + Sync,
>;

/// The topology a builder evaluates.
#[derive(Clone)]
pub enum TopologyBlock {
    /// A `route { }` block from a script, evaluated in the capability scope
    /// of the `configure` call that produced it
    Script {
        block: RouteBlock,
        scope: CapabilityScope,
        configurator: RouteConfigurator,
    },
    Native(NativeBlock),
}

impl TopologyBlock {
    pub fn native<F>(block: F) -> Self
    where
        F: Fn(&RouteDefinitionBuilder, &mut DefinitionBuilder) -> Result<(), TopologyError>
            + Send
            + Sync
            + 'static,
    {
        TopologyBlock::Native(Arc::new(block))
    }
}

impl fmt::Debug for TopologyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyBlock::Script { block, .. } => write!(
                f,
                "Script(line {}, {} statements)",
                block.pos.line,
                block.body.len()
            ),
            TopologyBlock::Native(_) => f.write_str("Native"),
        }
    }
}

/// Builds a route definition from a topology block.
#[derive(Clone)]
pub struct RouteDefinitionBuilder {
    block: TopologyBlock,
    components: Arc<dyn ComponentRegistry>,
    resolved: Arc<Mutex<Option<RouteDefinition>>>,
}

impl RouteDefinitionBuilder {
    /// Create a builder. A builder without a block is a caller error and is
    /// rejected here rather than on [`configure`](Self::configure).
    pub fn new(
        block: Option<TopologyBlock>,
        components: Arc<dyn ComponentRegistry>,
    ) -> Result<Self, TopologyError> {
        let block = block.ok_or(TopologyError::MissingBlock)?;
        Ok(Self {
            block,
            components,
            resolved: Arc::new(Mutex::new(None)),
        })
    }

    /// Evaluate the block into a definition.
    ///
    /// The block runs on the first successful call only; later calls, on this
    /// builder or its clones, return the same definition. A failed evaluation
    /// is not remembered.
    pub fn configure(&self) -> Result<RouteDefinition, TopologyError> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(definition) = resolved.as_ref() {
            return Ok(definition.clone());
        }

        let definition = match &self.block {
            TopologyBlock::Script {
                block,
                scope,
                configurator,
            } => configurator.evaluate_block(block, scope)?,
            TopologyBlock::Native(native) => {
                let mut definition = DefinitionBuilder::new();
                native(self, &mut definition)?;
                definition.build()?
            }
        };
        *resolved = Some(definition.clone());
        Ok(definition)
    }

    /// A processor that sets each pair as an outbound header. `None` yields
    /// a processor that does nothing.
    pub fn add_headers(headers: Option<Vec<(String, JsonValue)>>) -> ProcessorRef {
        Arc::new(HeaderInjector {
            headers: headers.unwrap_or_default(),
        })
    }

    /// Resolve a key in the engine's component registry.
    pub fn lookup(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.components.lookup(key)
    }
}

impl fmt::Debug for RouteDefinitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinitionBuilder")
            .field("block", &self.block)
            .finish()
    }
}

/// Processor behind `add_headers`.
#[derive(Debug)]
struct HeaderInjector {
    headers: Vec<(String, JsonValue)>,
}

impl Processor for HeaderInjector {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError> {
        for (name, value) in &self.headers {
            exchange.out_mut().set_header(name.clone(), value.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "add_headers"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::{Bean, Registry};
    use crate::topology::definition::Step;
    use routeplane_sdk::Message;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<dyn ComponentRegistry> {
        let registry = Registry::new();
        registry.register("mailer", Arc::new(Bean::new("Mailer")));
        Arc::new(registry)
    }

    #[test]
    fn test_builder_without_block_fails_at_construction() {
        assert!(matches!(
            RouteDefinitionBuilder::new(None, registry()),
            Err(TopologyError::MissingBlock)
        ));
    }

    #[test]
    fn test_native_block() {
        let builder = RouteDefinitionBuilder::new(
            Some(TopologyBlock::native(|_, b| {
                b.from("direct:start")?.to("mock:result")?;
                Ok(())
            })),
            registry(),
        )
        .unwrap();

        let def = builder.configure().unwrap();
        assert_eq!(
            def.steps(),
            &[Step::from("direct:start").unwrap(), Step::to("mock:result").unwrap()]
        );
    }

    #[test]
    fn test_native_block_uses_lookup() {
        let builder = RouteDefinitionBuilder::new(
            Some(TopologyBlock::native(|this, b| {
                let found = this.lookup("mailer").is_some();
                b.from("direct:a")?
                    .set_header("mailer_found", JsonValue::Bool(found))?;
                Ok(())
            })),
            registry(),
        )
        .unwrap();

        let routes = builder.configure().unwrap().routes();
        assert_eq!(
            routes[0].steps,
            vec![Step::SetHeader {
                name: "mailer_found".into(),
                value: json!(true)
            }]
        );
        assert!(builder.lookup("absent").is_none());
    }

    #[test]
    fn test_configure_evaluates_block_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let builder = RouteDefinitionBuilder::new(
            Some(TopologyBlock::native(move |_, b| {
                counter.fetch_add(1, Ordering::SeqCst);
                b.from("direct:once")?;
                Ok(())
            })),
            registry(),
        )
        .unwrap();

        let first = builder.configure().unwrap();
        let second = builder.clone().configure().unwrap();
        assert_eq!(first, second);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_configure_is_retried() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let builder = RouteDefinitionBuilder::new(
            Some(TopologyBlock::native(move |_, b| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(TopologyError::UnknownName("flaky".into()));
                }
                b.from("direct:retry")?;
                Ok(())
            })),
            registry(),
        )
        .unwrap();

        assert!(builder.configure().is_err());
        assert_eq!(builder.configure().unwrap().routes()[0].from.uri(), "direct:retry");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_add_headers_sets_outbound_headers() {
        let processor = RouteDefinitionBuilder::add_headers(Some(vec![
            ("route_slip".to_string(), json!("X")),
            ("reply_to".to_string(), json!("Y")),
        ]));

        let mut exchange = Exchange::new("ex", Message::new());
        exchange.out_mut().set_header("unrelated", "keep");
        processor.process(&mut exchange).unwrap();

        let out = exchange.out();
        assert_eq!(out.header_str("route_slip").as_deref(), Some("X"));
        assert_eq!(out.header_str("reply_to").as_deref(), Some("Y"));
        assert_eq!(out.header_str("unrelated").as_deref(), Some("keep"));
        assert_eq!(out.headers.len(), 3);
    }

    #[test]
    fn test_add_headers_none_is_noop() {
        let processor = RouteDefinitionBuilder::add_headers(None);
        let mut exchange = Exchange::new("ex", Message::new().header_value("in", 1));
        processor.process(&mut exchange).unwrap();
        assert!(exchange.out().headers.is_empty());
        assert_eq!(processor.name(), "add_headers");
    }
}
