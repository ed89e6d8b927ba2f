//! Route-config processor
//!
//! Turns a message carrying topology source into a `configure` message
//! carrying the evaluated [`RouteDefinitionBuilder`]. The control channel
//! applies it to every message classified as `code`.

use routeplane_sdk::{Body, Exchange, ProcessError, Processor};

use crate::environment;
use crate::topology::builder::RouteDefinitionBuilder;
use crate::topology::configurator::RouteConfigurator;

#[derive(Debug, Clone)]
pub struct RouteConfigProcessor {
    configurator: RouteConfigurator,
}

impl RouteConfigProcessor {
    pub fn new(configurator: RouteConfigurator) -> Self {
        Self { configurator }
    }
}

impl Processor for RouteConfigProcessor {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError> {
        let inbound = exchange.in_message();
        let source = inbound.body_text().ok_or(ProcessError::UnsupportedBody {
            expected: "text",
            found: inbound.body.kind(),
        })?;

        let builder: RouteDefinitionBuilder = self
            .configurator
            .configure(source)
            .map_err(ProcessError::failed)?;
        tracing::debug!(builder = ?builder, "Evaluated topology source");

        let mut headers = inbound.headers.clone();
        headers.retain(|k, _| {
            !k.eq_ignore_ascii_case(environment::PAYLOAD_CLASSIFIER)
                && !k.eq_ignore_ascii_case(environment::SIGNAL)
        });

        let out = exchange.out_mut();
        out.headers = headers;
        out.set_header(environment::SIGNAL, environment::SIG_CONFIGURE);
        out.body = Body::object(builder);
        Ok(())
    }

    fn name(&self) -> &str {
        "route_config"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::engine::registry::Registry;
    use crate::topology::configurator::ResetPolicy;
    use routeplane_sdk::Message;
    use std::sync::Arc;

    fn processor() -> RouteConfigProcessor {
        RouteConfigProcessor::new(RouteConfigurator::with_policy(
            Arc::new(Configuration::new()),
            Arc::new(Registry::new()),
            ResetPolicy::Retain,
        ))
    }

    #[test]
    fn test_source_becomes_configure_message() {
        let inbound = Message::with_body("route { from('direct:a').to('mock:b') }")
            .header_value(environment::PAYLOAD_CLASSIFIER, environment::CODE_CLASSIFIER)
            .header_value(environment::SIGNAL, "start")
            .header_value("correlation", "c-1");
        let mut exchange = Exchange::new("ex-1", inbound);

        processor().process(&mut exchange).unwrap();

        let out = exchange.into_out();
        assert_eq!(out.header_str(environment::SIGNAL).as_deref(), Some("configure"));
        assert_eq!(out.header_str("correlation").as_deref(), Some("c-1"));
        assert!(out.header(environment::PAYLOAD_CLASSIFIER).is_none());

        let builder = out.body.downcast::<RouteDefinitionBuilder>().unwrap();
        assert_eq!(builder.configure().unwrap().routes().len(), 1);
    }

    #[test]
    fn test_non_text_body_is_rejected() {
        let mut exchange = Exchange::new("ex-2", Message::new());
        let err = processor().process(&mut exchange).unwrap_err();
        assert!(matches!(err, ProcessError::UnsupportedBody { found: "empty", .. }));
    }

    #[test]
    fn test_evaluation_failure_is_reported() {
        let mut exchange = Exchange::new("ex-3", Message::with_body("from('direct:a')"));
        let err = processor().process(&mut exchange).unwrap_err();
        assert!(matches!(err, ProcessError::Failed(_)));
    }
}
