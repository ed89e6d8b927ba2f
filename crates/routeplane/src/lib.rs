//! Routeplane - control plane for a message-routing host
//!
//! Topology scripts are evaluated into route definitions by a
//! [`RouteConfigurator`](topology::RouteConfigurator) and pushed into the
//! live [`RoutingEngine`](engine::RoutingEngine) through the control
//! channel, which also starts, stops and terminates the host on signal.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod control;
pub mod engine;
pub mod environment;
pub mod runtime;
pub mod telemetry;
pub mod topology;
