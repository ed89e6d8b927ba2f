//! Processor trait and closure adapters
//!
//! A processor is the unit of work a topology step performs on an exchange.
//! Topology authors get processors from helpers such as `add_headers`, from
//! registry lookups, or by wrapping a closure.
//!
//! # Example
//!
//! ```ignore
//! use routeplane_sdk::prelude::*;
//!
//! let stamp = FnProcessor::new(|exchange: &mut Exchange| {
//!     exchange.out_mut().set_header("stamped", true);
//!     Ok(())
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::exchange::Exchange;

/// A unit of work applied to an exchange.
pub trait Processor: Send + Sync {
    /// Process the exchange in place.
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError>;

    /// Name used in logs and route summaries.
    fn name(&self) -> &str {
        "processor"
    }
}

/// Shared processor handle
pub type ProcessorRef = Arc<dyn Processor>;

/// Processor that delegates to a closure for deferred execution.
pub struct FnProcessor<F> {
    name: String,
    func: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<(), ProcessError> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self::named("fn", func)
    }

    /// Wrap a closure under a descriptive name.
    pub fn named(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<(), ProcessError> + Send + Sync,
{
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessError> {
        (self.func)(exchange)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").field("name", &self.name).finish()
    }
}

/// Processor that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process(&self, _exchange: &mut Exchange) -> Result<(), ProcessError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
