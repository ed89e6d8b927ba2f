//! Control-channel processor
//!
//! A stateless signal dispatcher: `start` and `stop` go straight to the
//! managed engine, `configure` obtains a route definition and merges it,
//! `terminate` is reported back to the caller so the channel can fire the
//! termination channel. Anything else is ignored. All state lives in the
//! engine, so one processor may be shared across concurrent deliveries.
//!
//! Processing happens in two steps. [`resolve`] turns a message into a
//! [`ControlAction`], evaluating topology source if it has to, and never
//! touches the engine. [`apply`] performs the action on the engine. A caller
//! that bounds evaluation time bounds `resolve` only.
//!
//! [`resolve`]: ControlChannelProcessor::resolve
//! [`apply`]: ControlChannelProcessor::apply

use std::fmt;
use std::sync::Arc;

use routeplane_sdk::{Body, Exchange, Message, ProcessError, Processor};
use serde::Serialize;

use super::signal::Signal;
use super::ControlError;
use crate::engine::ManagedEngine;
use crate::topology::builder::RouteDefinitionBuilder;
use crate::topology::configurator::RouteConfigurator;
use crate::topology::definition::RouteDefinition;

/// What a processed control message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SignalOutcome {
    Started,
    Stopped,
    Configured { routes: usize },
    Terminate,
    Ignored,
}

/// The engine operation a control message asks for.
#[derive(Debug)]
pub enum ControlAction {
    Start,
    Stop,
    Merge(RouteDefinition),
    Terminate,
    Ignore,
}

pub struct ControlChannelProcessor {
    engine: Arc<dyn ManagedEngine>,
    configurator: RouteConfigurator,
}

impl ControlChannelProcessor {
    /// Both collaborators are required.
    pub fn new(
        engine: Option<Arc<dyn ManagedEngine>>,
        configurator: Option<RouteConfigurator>,
    ) -> Result<Self, ControlError> {
        let engine = engine.ok_or(ControlError::InvalidArgument("engine handle"))?;
        let configurator =
            configurator.ok_or(ControlError::InvalidArgument("route configurator"))?;
        Ok(Self {
            engine,
            configurator,
        })
    }

    /// Apply the signal carried by `message`.
    pub fn process(&self, message: &Message) -> Result<SignalOutcome, ControlError> {
        let action = self.resolve(message)?;
        self.apply(action)
    }

    /// Work out what `message` asks for without touching the engine.
    pub fn resolve(&self, message: &Message) -> Result<ControlAction, ControlError> {
        let Some(signal) = Signal::from_message(message) else {
            tracing::debug!(
                signal = ?message.header_str(crate::environment::SIGNAL),
                "Ignoring unrecognized control signal"
            );
            return Ok(ControlAction::Ignore);
        };
        tracing::info!(signal = %signal, body = message.body.kind(), "Control signal received");

        Ok(match signal {
            Signal::Start => ControlAction::Start,
            Signal::Stop => ControlAction::Stop,
            Signal::Configure => ControlAction::Merge(self.definition(&message.body)?),
            Signal::Terminate => ControlAction::Terminate,
        })
    }

    /// Perform a resolved action on the engine.
    pub fn apply(&self, action: ControlAction) -> Result<SignalOutcome, ControlError> {
        match action {
            ControlAction::Start => {
                self.engine.start()?;
                Ok(SignalOutcome::Started)
            }
            ControlAction::Stop => {
                self.engine.stop()?;
                Ok(SignalOutcome::Stopped)
            }
            ControlAction::Merge(definition) => {
                let routes = self.engine.add_routes(definition)?;
                tracing::info!(routes, "Topology merged into engine");
                Ok(SignalOutcome::Configured { routes })
            }
            ControlAction::Terminate => Ok(SignalOutcome::Terminate),
            ControlAction::Ignore => Ok(SignalOutcome::Ignored),
        }
    }

    fn definition(&self, body: &Body) -> Result<RouteDefinition, ControlError> {
        if let Some(builder) = body.downcast::<RouteDefinitionBuilder>() {
            return Ok(builder.configure()?);
        }
        if let Some(definition) = body.downcast::<RouteDefinition>() {
            return Ok(definition.clone());
        }
        match body.as_text() {
            Some(source) => Ok(self.configurator.configure(source)?.configure()?),
            None => Err(ControlError::UnsupportedPayload(body.kind())),
        }
    }
}

impl Processor for ControlChannelProcessor {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError> {
        let outcome = ControlChannelProcessor::process(self, exchange.in_message())
            .map_err(ProcessError::failed)?;
        exchange.out_mut().body = Body::Json(serde_json::to_value(outcome)?);
        Ok(())
    }

    fn name(&self) -> &str {
        "control-channel-processor"
    }
}

impl fmt::Debug for ControlChannelProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannelProcessor")
            .field("configurator", &self.configurator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::engine::registry::{ComponentRegistry, Registry};
    use crate::engine::EngineError;
    use crate::environment;
    use crate::topology::configurator::ResetPolicy;
    use crate::topology::TopologyError;
    use std::sync::Mutex;

    /// Records every call instead of routing anything.
    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<String>>,
        registry: Arc<Registry>,
    }

    impl RecordingEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ManagedEngine for RecordingEngine {
        fn start(&self) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push("start".into());
            Ok(())
        }

        fn stop(&self) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }

        fn add_routes(&self, definition: RouteDefinition) -> Result<usize, EngineError> {
            let routes = definition.routes();
            self.calls
                .lock()
                .unwrap()
                .push(format!("add_routes:{}", routes.len()));
            Ok(routes.len())
        }

        fn components(&self) -> Arc<dyn ComponentRegistry> {
            self.registry.clone()
        }
    }

    fn configurator() -> RouteConfigurator {
        RouteConfigurator::with_policy(
            Arc::new(Configuration::new()),
            Arc::new(Registry::new()),
            ResetPolicy::Retain,
        )
    }

    fn setup() -> (Arc<RecordingEngine>, ControlChannelProcessor) {
        let engine = Arc::new(RecordingEngine::default());
        let processor =
            ControlChannelProcessor::new(Some(engine.clone()), Some(configurator())).unwrap();
        (engine, processor)
    }

    fn signal(value: &str) -> Message {
        Message::new().header_value(environment::SIGNAL, value)
    }

    #[test]
    fn test_missing_dependencies_are_rejected() {
        let engine: Arc<dyn ManagedEngine> = Arc::new(RecordingEngine::default());
        assert!(matches!(
            ControlChannelProcessor::new(None, Some(configurator())),
            Err(ControlError::InvalidArgument(_))
        ));
        assert!(matches!(
            ControlChannelProcessor::new(Some(engine), None),
            Err(ControlError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unrecognized_signals_are_ignored() {
        let (engine, processor) = setup();
        for message in [signal("restart"), signal(""), Message::new()] {
            assert_eq!(processor.process(&message).unwrap(), SignalOutcome::Ignored);
        }
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_start_and_stop_call_engine_once() {
        let (engine, processor) = setup();
        assert_eq!(processor.process(&signal("start")).unwrap(), SignalOutcome::Started);
        assert_eq!(engine.calls(), vec!["start"]);

        assert_eq!(processor.process(&signal(" STOP ")).unwrap(), SignalOutcome::Stopped);
        assert_eq!(engine.calls(), vec!["start", "stop"]);
    }

    #[test]
    fn test_configure_from_source() {
        let (engine, processor) = setup();
        let message = Message::with_body("route { from('direct:a').to('mock:b') }")
            .header_value(environment::SIGNAL, "configure");
        assert_eq!(
            processor.process(&message).unwrap(),
            SignalOutcome::Configured { routes: 1 }
        );
        assert_eq!(engine.calls(), vec!["add_routes:1"]);
    }

    #[test]
    fn test_configure_with_prebuilt_builder_and_definition() {
        let (engine, processor) = setup();
        let builder = configurator()
            .configure("route { from('direct:a') from('direct:b') }")
            .unwrap();
        let definition = builder.configure().unwrap();

        let message = Message::with_body(Body::object(builder))
            .header_value(environment::SIGNAL, "configure");
        assert_eq!(
            processor.process(&message).unwrap(),
            SignalOutcome::Configured { routes: 2 }
        );

        let message = Message::with_body(Body::object(definition))
            .header_value(environment::SIGNAL, "configure");
        processor.process(&message).unwrap();
        assert_eq!(engine.calls(), vec!["add_routes:2", "add_routes:2"]);
    }

    #[test]
    fn test_configure_with_unsupported_body() {
        let (engine, processor) = setup();
        let message = Message::with_body(Body::object(42_u32))
            .header_value(environment::SIGNAL, "configure");
        assert!(matches!(
            processor.process(&message),
            Err(ControlError::UnsupportedPayload("object"))
        ));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_failed_evaluation_does_not_poison_processor() {
        let (engine, processor) = setup();
        let bad = Message::with_body("route { from('direct:a') } route { }")
            .header_value(environment::SIGNAL, "configure");
        assert!(matches!(
            processor.process(&bad),
            Err(ControlError::Topology(TopologyError::MultipleRoutes { count: 2 }))
        ));

        assert_eq!(processor.process(&signal("start")).unwrap(), SignalOutcome::Started);
        assert_eq!(engine.calls(), vec!["start"]);
    }

    #[test]
    fn test_resolve_never_touches_engine() {
        let (engine, processor) = setup();
        let configure = Message::with_body("route { from('direct:a') }")
            .header_value(environment::SIGNAL, "configure");
        for message in [signal("start"), signal("stop"), signal("terminate"), configure] {
            processor.resolve(&message).unwrap();
        }
        assert!(engine.calls().is_empty());

        let message = Message::with_body("route { from('direct:b') }")
            .header_value(environment::SIGNAL, "configure");
        let action = processor.resolve(&message).unwrap();
        assert!(matches!(action, ControlAction::Merge(_)));
        assert_eq!(processor.apply(action).unwrap(), SignalOutcome::Configured { routes: 1 });
        assert_eq!(engine.calls(), vec!["add_routes:1"]);
    }

    #[test]
    fn test_terminate_leaves_engine_alone() {
        let (engine, processor) = setup();
        assert_eq!(processor.process(&signal("terminate")).unwrap(), SignalOutcome::Terminate);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_processor_trait_writes_outcome() {
        let (_engine, processor) = setup();
        let mut exchange = Exchange::new("ex", signal("start"));
        Processor::process(&processor, &mut exchange).unwrap();
        assert_eq!(processor.name(), "control-channel-processor");
        let Body::Json(value) = &exchange.out().body else {
            panic!("expected a json body");
        };
        assert_eq!(value["outcome"], "started");
    }
}
