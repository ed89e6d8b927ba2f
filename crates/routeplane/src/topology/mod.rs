//! Route topology: definitions, the script language that produces them and
//! the session that evaluates scripts.

pub mod builder;
pub mod capability;
pub mod configurator;
pub mod definition;
pub mod error;
pub mod predicate;
pub mod script;
pub mod value;

pub use builder::{RouteDefinitionBuilder, TopologyBlock};
pub use capability::{Args, CapabilityError, CapabilityRegistry, TypeDescriptor};
pub use configurator::{CapabilityScope, ResetPolicy, RouteConfigurator};
pub use definition::{DefinitionBuilder, Endpoint, Route, RouteDefinition, Step};
pub use error::TopologyError;
pub use predicate::{Operand, Predicate};
pub use value::{Symbol, Value};
