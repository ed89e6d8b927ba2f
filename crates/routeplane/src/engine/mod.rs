//! Managed routing engine
//!
//! The control plane only ever talks to the engine through [`ManagedEngine`]:
//! lifecycle (`start`/`stop`), merging new topology (`add_routes`) and
//! resolving components. [`RoutingEngine`] is the in-process implementation
//! used by the host binary. All three mutating operations take the same lock,
//! so a `configure` can never interleave with a `stop`.

pub mod registry;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::topology::definition::{Interceptor, Route, RouteDefinition, Step};
use registry::{ComponentRegistry, Registry};

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Endpoint {endpoint} already has a consumer")]
    DuplicateConsumer { endpoint: String },

    #[error("Route from {endpoint} references unknown processor `{key}`")]
    UnresolvedReference { endpoint: String, key: String },

    #[error("Interceptor references unknown processor `{key}`")]
    UnresolvedInterceptorReference { key: String },
}

/// The live routing engine as seen by the control plane.
pub trait ManagedEngine: Send + Sync {
    /// Start consuming. Starting a started engine does nothing.
    fn start(&self) -> Result<(), EngineError>;

    /// Stop consuming. Stopping a stopped engine does nothing.
    fn stop(&self) -> Result<(), EngineError>;

    /// Merge a definition into the running topology, returning the number of
    /// routes installed.
    fn add_routes(&self, definition: RouteDefinition) -> Result<usize, EngineError>;

    /// The engine's own component registry.
    fn components(&self) -> Arc<dyn ComponentRegistry>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Started,
    Stopped,
}

/// A route accepted by the engine
#[derive(Debug, Clone)]
pub struct InstalledRoute {
    pub id: Uuid,
    pub route: Route,
    pub installed_at: DateTime<Utc>,
}

/// Serializable snapshot of an installed route
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub id: Uuid,
    pub from: String,
    pub steps: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

impl From<&InstalledRoute> for RouteSummary {
    fn from(installed: &InstalledRoute) -> Self {
        Self {
            id: installed.id,
            from: installed.route.from.uri().to_string(),
            steps: installed.route.steps.iter().map(ToString::to_string).collect(),
            installed_at: installed.installed_at,
        }
    }
}

struct EngineState {
    status: EngineStatus,
    routes: Vec<InstalledRoute>,
    interceptors: Vec<Interceptor>,
}

/// In-process routing engine.
pub struct RoutingEngine {
    state: Mutex<EngineState>,
    components: Arc<Registry>,
}

impl RoutingEngine {
    pub fn new(components: Arc<Registry>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                status: EngineStatus::Stopped,
                routes: Vec::new(),
                interceptors: Vec::new(),
            }),
            components,
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.state().status
    }

    pub fn route_count(&self) -> usize {
        self.state().routes.len()
    }

    pub fn interceptor_count(&self) -> usize {
        self.state().interceptors.len()
    }

    pub fn routes(&self) -> Vec<RouteSummary> {
        self.state().routes.iter().map(RouteSummary::from).collect()
    }

    /// Concrete registry, for host-side registration.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.components)
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First `process_ref` key among `steps`, nested blocks included, with
    /// no registered component.
    fn unresolved_reference<'a>(&self, steps: &'a [Step]) -> Option<&'a str> {
        let mut pending: Vec<&Step> = steps.iter().collect();
        while let Some(step) = pending.pop() {
            match step {
                Step::ProcessRef(key) if !self.components.contains(key) => return Some(key),
                Step::Intercept { steps, .. } => pending.extend(steps),
                Step::Choice { branches, otherwise } => {
                    for branch in branches {
                        pending.extend(&branch.steps);
                    }
                    if let Some(steps) = otherwise {
                        pending.extend(steps);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl ManagedEngine for RoutingEngine {
    fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.status == EngineStatus::Started {
            tracing::debug!("Engine already started");
            return Ok(());
        }
        state.status = EngineStatus::Started;
        tracing::info!(routes = state.routes.len(), "Engine started");
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.status == EngineStatus::Stopped {
            tracing::debug!("Engine already stopped");
            return Ok(());
        }
        state.status = EngineStatus::Stopped;
        tracing::info!(routes = state.routes.len(), "Engine stopped");
        Ok(())
    }

    fn add_routes(&self, definition: RouteDefinition) -> Result<usize, EngineError> {
        let routes = definition.routes();
        let interceptors = definition.interceptors();

        let mut state = self.state();

        // validate the whole batch before touching state
        let mut consumed: HashSet<&str> = state.routes.iter().map(|r| r.route.from.uri()).collect();
        for route in &routes {
            if !consumed.insert(route.from.uri()) {
                return Err(EngineError::DuplicateConsumer {
                    endpoint: route.from.uri().to_string(),
                });
            }
            if let Some(key) = self.unresolved_reference(&route.steps) {
                return Err(EngineError::UnresolvedReference {
                    endpoint: route.from.uri().to_string(),
                    key: key.to_string(),
                });
            }
        }
        for interceptor in &interceptors {
            if let Some(key) = self.unresolved_reference(&interceptor.steps) {
                return Err(EngineError::UnresolvedInterceptorReference {
                    key: key.to_string(),
                });
            }
        }

        let installed_at = Utc::now();
        let added = routes.len();
        for route in routes {
            let id = Uuid::new_v4();
            tracing::info!(route_id = %id, from = %route.from, steps = route.steps.len(), "Installed route");
            state.routes.push(InstalledRoute {
                id,
                route,
                installed_at,
            });
        }
        state.interceptors.extend(interceptors);
        Ok(added)
    }

    fn components(&self) -> Arc<dyn ComponentRegistry> {
        self.components.clone()
    }
}

impl fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RoutingEngine")
            .field("status", &state.status)
            .field("routes", &state.routes.len())
            .field("interceptors", &state.interceptors.len())
            .finish()
    }
}
