//! Route definition model and the engine's native definition builder
//!
//! A [`RouteDefinition`] is the ordered list of root steps produced by one
//! topology evaluation. [`DefinitionBuilder`] accumulates those steps,
//! tracking open `intercept` and `choice` blocks on a frame stack so that
//! `when`, `otherwise` and `end` land where they belong.

use std::fmt;
use std::sync::Arc;

use routeplane_sdk::ProcessorRef;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use url::Url;

use super::error::TopologyError;
use super::predicate::Predicate;

/// A validated endpoint URI such as `direct:start` or `jetty://0.0.0.0:8088/cc`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    uri: String,
    url: Url,
}

impl Endpoint {
    pub fn parse(uri: &str) -> Result<Self, TopologyError> {
        let trimmed = uri.trim();
        let url = Url::parse(trimmed).map_err(|e| TopologyError::InvalidEndpoint {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            uri: trimmed.to_string(),
            url,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Endpoint {}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uri)
    }
}

/// One `when` branch of a choice.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub predicate: Predicate,
    pub steps: Vec<Step>,
}

/// A routing step.
#[derive(Clone)]
pub enum Step {
    From(Endpoint),
    To(Endpoint),
    Process(ProcessorRef),
    ProcessRef(String),
    SetHeader {
        name: String,
        value: JsonValue,
    },
    Intercept {
        predicate: Option<Predicate>,
        steps: Vec<Step>,
    },
    Choice {
        branches: Vec<WhenClause>,
        otherwise: Option<Vec<Step>>,
    },
    Proceed,
    Stop,
}

impl Step {
    pub fn from(uri: &str) -> Result<Step, TopologyError> {
        Endpoint::parse(uri).map(Step::From)
    }

    pub fn to(uri: &str) -> Result<Step, TopologyError> {
        Endpoint::parse(uri).map(Step::To)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::From(_) => "from",
            Step::To(_) => "to",
            Step::Process(_) => "process",
            Step::ProcessRef(_) => "process_ref",
            Step::SetHeader { .. } => "set_header",
            Step::Intercept { .. } => "intercept",
            Step::Choice { .. } => "choice",
            Step::Proceed => "proceed",
            Step::Stop => "stop",
        }
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Step::From(a), Step::From(b)) | (Step::To(a), Step::To(b)) => a == b,
            (Step::Process(a), Step::Process(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Step::ProcessRef(a), Step::ProcessRef(b)) => a == b,
            (
                Step::SetHeader { name: n1, value: v1 },
                Step::SetHeader { name: n2, value: v2 },
            ) => n1 == n2 && v1 == v2,
            (
                Step::Intercept { predicate: p1, steps: s1 },
                Step::Intercept { predicate: p2, steps: s2 },
            ) => p1 == p2 && s1 == s2,
            (
                Step::Choice { branches: b1, otherwise: o1 },
                Step::Choice { branches: b2, otherwise: o2 },
            ) => b1 == b2 && o1 == o2,
            (Step::Proceed, Step::Proceed) | (Step::Stop, Step::Stop) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::From(e) => write!(f, "From({})", e),
            Step::To(e) => write!(f, "To({})", e),
            Step::Process(p) => write!(f, "Process({})", p.name()),
            Step::ProcessRef(k) => write!(f, "ProcessRef({})", k),
            Step::SetHeader { name, value } => write!(f, "SetHeader({} = {})", name, value),
            Step::Intercept { predicate, steps } => f
                .debug_struct("Intercept")
                .field("predicate", predicate)
                .field("steps", steps)
                .finish(),
            Step::Choice { branches, otherwise } => f
                .debug_struct("Choice")
                .field("branches", branches)
                .field("otherwise", otherwise)
                .finish(),
            Step::Proceed => f.write_str("Proceed"),
            Step::Stop => f.write_str("Stop"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::From(e) => write!(f, "from({})", e),
            Step::To(e) => write!(f, "to({})", e),
            Step::Process(p) => write!(f, "process({})", p.name()),
            Step::ProcessRef(k) => write!(f, "process_ref({})", k),
            Step::SetHeader { name, value } => write!(f, "set_header({}, {})", name, value),
            Step::Intercept { predicate: Some(p), steps } => {
                write!(f, "intercept({}) [{} steps]", p, steps.len())
            }
            Step::Intercept { predicate: None, steps } => {
                write!(f, "intercept [{} steps]", steps.len())
            }
            Step::Choice { branches, otherwise } => write!(
                f,
                "choice [{} when{}]",
                branches.len(),
                if otherwise.is_some() { ", otherwise" } else { "" }
            ),
            Step::Proceed => f.write_str("proceed"),
            Step::Stop => f.write_str("stop"),
        }
    }
}

/// A single route: a consumer endpoint and the steps that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub from: Endpoint,
    pub steps: Vec<Step>,
}

/// An interceptor applied ahead of every route of the definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Interceptor {
    pub predicate: Option<Predicate>,
    pub steps: Vec<Step>,
}

/// The ordered root steps of one topology evaluation. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteDefinition {
    steps: Vec<Step>,
}

impl RouteDefinition {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Split the root steps into one route per `from`.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = Vec::new();
        for step in &self.steps {
            match step {
                Step::From(endpoint) => routes.push(Route {
                    from: endpoint.clone(),
                    steps: Vec::new(),
                }),
                Step::Intercept { .. } => {}
                other => {
                    if let Some(route) = routes.last_mut() {
                        route.steps.push(other.clone());
                    }
                }
            }
        }
        routes
    }

    pub fn interceptors(&self) -> Vec<Interceptor> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Intercept { predicate, steps } => Some(Interceptor {
                    predicate: predicate.clone(),
                    steps: steps.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

enum Frame {
    Intercept {
        predicate: Option<Predicate>,
        steps: Vec<Step>,
    },
    Choice {
        branches: Vec<WhenClause>,
        current: Option<WhenClause>,
        otherwise: Option<Vec<Step>>,
    },
}

impl Frame {
    fn close(self) -> Result<Step, TopologyError> {
        match self {
            Frame::Intercept { predicate, steps } => Ok(Step::Intercept { predicate, steps }),
            Frame::Choice {
                mut branches,
                current,
                otherwise,
            } => {
                branches.extend(current);
                if branches.is_empty() {
                    return Err(TopologyError::MisplacedStep(
                        "choice closed without any when".to_string(),
                    ));
                }
                Ok(Step::Choice {
                    branches,
                    otherwise,
                })
            }
        }
    }
}

/// Incremental builder for a [`RouteDefinition`].
#[derive(Default)]
pub struct DefinitionBuilder {
    root: Vec<Step>,
    frames: Vec<Frame>,
    has_route: bool,
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new route. Closes any open block.
    pub fn from(&mut self, uri: &str) -> Result<&mut Self, TopologyError> {
        let endpoint = Endpoint::parse(uri)?;
        self.close_all()?;
        self.root.push(Step::From(endpoint));
        self.has_route = true;
        Ok(self)
    }

    /// Open an interceptor. Closes any open block.
    pub fn intercept(&mut self, predicate: Option<Predicate>) -> Result<&mut Self, TopologyError> {
        self.close_all()?;
        self.frames.push(Frame::Intercept {
            predicate,
            steps: Vec::new(),
        });
        Ok(self)
    }

    pub fn to(&mut self, uri: &str) -> Result<&mut Self, TopologyError> {
        let endpoint = Endpoint::parse(uri)?;
        self.push(Step::To(endpoint), "to")
    }

    pub fn process(&mut self, processor: ProcessorRef) -> Result<&mut Self, TopologyError> {
        self.push(Step::Process(processor), "process")
    }

    pub fn process_ref(&mut self, key: &str) -> Result<&mut Self, TopologyError> {
        self.push(Step::ProcessRef(key.to_string()), "process_ref")
    }

    pub fn set_header(&mut self, name: &str, value: JsonValue) -> Result<&mut Self, TopologyError> {
        self.push(
            Step::SetHeader {
                name: name.to_string(),
                value,
            },
            "set_header",
        )
    }

    pub fn proceed(&mut self) -> Result<&mut Self, TopologyError> {
        self.push(Step::Proceed, "proceed")
    }

    pub fn stop(&mut self) -> Result<&mut Self, TopologyError> {
        self.push(Step::Stop, "stop")
    }

    pub fn choice(&mut self) -> Result<&mut Self, TopologyError> {
        self.target("choice")?;
        self.frames.push(Frame::Choice {
            branches: Vec::new(),
            current: None,
            otherwise: None,
        });
        Ok(self)
    }

    pub fn when(&mut self, predicate: Predicate) -> Result<&mut Self, TopologyError> {
        match self.frames.last_mut() {
            Some(Frame::Choice {
                branches,
                current,
                otherwise: None,
            }) => {
                branches.extend(current.take());
                *current = Some(WhenClause {
                    predicate,
                    steps: Vec::new(),
                });
                Ok(self)
            }
            Some(Frame::Choice { .. }) => Err(TopologyError::MisplacedStep(
                "when after otherwise".to_string(),
            )),
            _ => Err(TopologyError::MisplacedStep(
                "when outside a choice".to_string(),
            )),
        }
    }

    pub fn otherwise(&mut self) -> Result<&mut Self, TopologyError> {
        match self.frames.last_mut() {
            Some(Frame::Choice {
                branches,
                current,
                otherwise,
            }) => {
                if otherwise.is_some() {
                    return Err(TopologyError::MisplacedStep(
                        "second otherwise in a choice".to_string(),
                    ));
                }
                branches.extend(current.take());
                if branches.is_empty() {
                    return Err(TopologyError::MisplacedStep(
                        "otherwise without a preceding when".to_string(),
                    ));
                }
                *otherwise = Some(Vec::new());
                Ok(self)
            }
            _ => Err(TopologyError::MisplacedStep(
                "otherwise outside a choice".to_string(),
            )),
        }
    }

    /// Close the innermost open block.
    pub fn end(&mut self) -> Result<&mut Self, TopologyError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| TopologyError::MisplacedStep("end without an open block".to_string()))?;
        let step = frame.close()?;
        self.attach(step);
        Ok(self)
    }

    pub fn build(mut self) -> Result<RouteDefinition, TopologyError> {
        self.close_all()?;
        Ok(RouteDefinition { steps: self.root })
    }

    fn close_all(&mut self) -> Result<(), TopologyError> {
        while !self.frames.is_empty() {
            self.end()?;
        }
        Ok(())
    }

    fn push(&mut self, step: Step, verb: &str) -> Result<&mut Self, TopologyError> {
        self.target(verb)?.push(step);
        Ok(self)
    }

    /// The step list new steps are appended to.
    fn target(&mut self, verb: &str) -> Result<&mut Vec<Step>, TopologyError> {
        match self.frames.last_mut() {
            Some(Frame::Intercept { steps, .. }) => Ok(steps),
            Some(Frame::Choice {
                otherwise: Some(steps),
                ..
            }) => Ok(steps),
            Some(Frame::Choice {
                current: Some(clause),
                ..
            }) => Ok(&mut clause.steps),
            Some(Frame::Choice { .. }) => Err(TopologyError::MisplacedStep(format!(
                "{} inside a choice before any when",
                verb
            ))),
            None if self.has_route => Ok(&mut self.root),
            None => Err(TopologyError::MisplacedStep(format!(
                "{} before any from",
                verb
            ))),
        }
    }

    /// Attach a closed block to its parent. Interceptors always sit at the root.
    fn attach(&mut self, step: Step) {
        if matches!(step, Step::Intercept { .. }) || self.frames.is_empty() {
            self.root.push(step);
            return;
        }
        if let Ok(target) = self.target("block") {
            target.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::predicate::Operand;
    use serde_json::json;

    fn is_signal(value: &str) -> Predicate {
        Predicate::Equals(Operand::Header("signal".into()), json!(value))
    }

    #[test]
    fn test_simple_route_steps() {
        let mut builder = DefinitionBuilder::new();
        builder.from("direct:start").unwrap().to("mock:result").unwrap();
        let def = builder.build().unwrap();

        assert_eq!(
            def.steps(),
            &[Step::from("direct:start").unwrap(), Step::to("mock:result").unwrap()]
        );
    }

    #[test]
    fn test_endpoint_requires_scheme() {
        assert!(matches!(
            Endpoint::parse("no-scheme"),
            Err(TopologyError::InvalidEndpoint { .. })
        ));
        let ep = Endpoint::parse("jetty://0.0.0.0:8088/control").unwrap();
        assert_eq!(ep.scheme(), "jetty");
        assert_eq!(ep.uri(), "jetty://0.0.0.0:8088/control");
    }

    #[test]
    fn test_to_before_from_is_misplaced() {
        let mut builder = DefinitionBuilder::new();
        assert!(matches!(
            builder.to("mock:a"),
            Err(TopologyError::MisplacedStep(_))
        ));
    }

    #[test]
    fn test_choice_branches() {
        let mut b = DefinitionBuilder::new();
        b.from("direct:cc").unwrap();
        b.choice().unwrap();
        b.when(is_signal("terminate")).unwrap();
        b.to("direct:shutdown").unwrap();
        b.otherwise().unwrap();
        b.process_ref("control-channel-processor").unwrap();
        let def = b.build().unwrap();

        assert_eq!(def.steps().len(), 2);
        match &def.steps()[1] {
            Step::Choice { branches, otherwise } => {
                assert_eq!(branches.len(), 1);
                assert_eq!(branches[0].steps, vec![Step::to("direct:shutdown").unwrap()]);
                assert_eq!(
                    otherwise.as_deref(),
                    Some(&[Step::ProcessRef("control-channel-processor".into())][..])
                );
            }
            other => panic!("expected choice, got {:?}", other),
        }
    }

    #[test]
    fn test_choice_structure_errors() {
        let mut b = DefinitionBuilder::new();
        b.from("direct:a").unwrap();
        assert!(b.when(is_signal("x")).is_err());

        b.choice().unwrap();
        assert!(b.otherwise().is_err());
        b.when(is_signal("x")).unwrap();
        b.otherwise().unwrap();
        assert!(b.otherwise().is_err());
        assert!(b.when(is_signal("y")).is_err());
    }

    #[test]
    fn test_empty_choice_fails_on_build() {
        let mut b = DefinitionBuilder::new();
        b.from("direct:a").unwrap().choice().unwrap();
        assert!(matches!(b.build(), Err(TopologyError::MisplacedStep(_))));
    }

    #[test]
    fn test_intercept_closed_by_from() {
        let mut b = DefinitionBuilder::new();
        b.intercept(Some(is_signal("configure"))).unwrap();
        b.proceed().unwrap();
        b.from("direct:a").unwrap().to("mock:b").unwrap();
        let def = b.build().unwrap();

        let interceptors = def.interceptors();
        assert_eq!(interceptors.len(), 1);
        assert_eq!(interceptors[0].steps, vec![Step::Proceed]);

        let routes = def.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].from.uri(), "direct:a");
        assert_eq!(routes[0].steps, vec![Step::to("mock:b").unwrap()]);
    }

    #[test]
    fn test_nested_choice_with_end() {
        let mut b = DefinitionBuilder::new();
        b.from("direct:a").unwrap();
        b.choice().unwrap().when(is_signal("a")).unwrap();
        b.choice().unwrap().when(is_signal("b")).unwrap().to("mock:ab").unwrap();
        b.end().unwrap();
        b.to("mock:a").unwrap();
        b.end().unwrap();
        b.to("mock:after").unwrap();
        let routes = b.build().unwrap().routes();

        assert_eq!(routes[0].steps.len(), 2);
        match &routes[0].steps[0] {
            Step::Choice { branches, .. } => {
                assert_eq!(branches[0].steps.len(), 2);
                assert!(matches!(branches[0].steps[0], Step::Choice { .. }));
            }
            other => panic!("expected choice, got {:?}", other),
        }
    }

    #[test]
    fn test_routes_split_on_from() {
        let mut b = DefinitionBuilder::new();
        b.from("direct:a").unwrap().to("mock:a").unwrap();
        b.from("direct:b").unwrap().stop().unwrap();
        let routes = b.build().unwrap().routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].steps, vec![Step::Stop]);
    }
}
