//! Control plane: signal processing and the channel that serves it

pub mod channel;
pub mod processor;
pub mod route_config;
pub mod signal;
pub mod termination;

use routeplane_sdk::ProcessError;
use thiserror::Error;

use crate::engine::EngineError;
use crate::runtime::actor::ActorError;
use crate::topology::TopologyError;

pub use channel::{ChannelSettings, ControlChannel};
pub use processor::{ControlChannelProcessor, SignalOutcome};
pub use route_config::RouteConfigProcessor;
pub use signal::Signal;
pub use termination::TerminationChannel;

/// Errors raised while handling control messages
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Invalid argument: {0} is required")]
    InvalidArgument(&'static str),

    #[error("Unsupported configure payload: {0} body")]
    UnsupportedPayload(&'static str),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Actor(#[from] ActorError),
}
