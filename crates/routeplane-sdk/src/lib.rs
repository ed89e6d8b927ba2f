//! Routeplane SDK - message, exchange and processor types
//!
//! This crate provides the types that processors use to interact with
//! exchanges flowing through a Routeplane topology.

pub mod error;
pub mod exchange;
pub mod message;
pub mod processor;

pub mod prelude {
    //! Common imports for processor authors
    pub use crate::error::ProcessError;
    pub use crate::exchange::Exchange;
    pub use crate::message::{Body, Message};
    pub use crate::processor::{FnProcessor, NoopProcessor, Processor, ProcessorRef};
    pub use serde_json::{json, Value as JsonValue};
}

// Re-export key types at crate root
pub use error::ProcessError;
pub use exchange::Exchange;
pub use message::{Body, Message};
pub use processor::{FnProcessor, NoopProcessor, Processor, ProcessorRef};
