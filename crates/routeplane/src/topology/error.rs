//! Topology errors

use thiserror::Error;

use super::capability::CapabilityError;
use super::script::ParseError;
use crate::config::ConfigError;

/// Errors raised while building or evaluating a topology
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Route builder has no topology block")]
    MissingBlock,

    #[error("Script defines no top-level route block")]
    NoRouteBlock,

    #[error("Script defines {count} top-level route blocks, expected exactly one")]
    MultipleRoutes { count: usize },

    #[error("Misplaced step: {0}")]
    MisplacedStep(String),

    #[error("Invalid endpoint `{uri}`: {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    #[error("Unknown name `{0}`")]
    UnknownName(String),

    #[error("Unknown method `{method}` on {receiver}")]
    UnknownMethod { receiver: &'static str, method: String },

    #[error("`{call}` expects {expected}, found {found}")]
    TypeMismatch {
        call: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Expression nests deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("Invalid script source: {0}")]
    InvalidSource(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
