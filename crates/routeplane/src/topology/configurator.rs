//! Route configurator and its long-lived topology session
//!
//! Every `configure` call evaluates against the same [`TopologySession`],
//! shared for the lifetime of the configurator. Capabilities registered by
//! one script are visible to the next unless the session's
//! [`ResetPolicy`] is `per-evaluation`, in which case each `configure` starts
//! a new [`CapabilityScope`] holding only the host registrations. Builders
//! produced earlier keep the scope they were produced in. `let` bindings
//! never outlive the evaluation that made them.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::builder::{RouteDefinitionBuilder, TopologyBlock};
use super::capability::{Args, CapabilityError, CapabilityRegistry, Origin, TypeCatalog, TypeDescriptor};
use super::definition::RouteDefinition;
use super::error::TopologyError;
use super::script::{self, eval::Evaluator, eval::RouteBlock};
use super::value::Value;
use crate::config::{ConfigError, Configuration};
use crate::engine::registry::ComponentRegistry;
use crate::environment;

/// What happens to script-registered capabilities between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    #[default]
    Retain,
    PerEvaluation,
}

impl FromStr for ResetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(ResetPolicy::Retain),
            "per-evaluation" | "per_evaluation" => Ok(ResetPolicy::PerEvaluation),
            other => Err(format!(
                "unknown reset policy `{}` (expected `retain` or `per-evaluation`)",
                other
            )),
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetPolicy::Retain => f.write_str("retain"),
            ResetPolicy::PerEvaluation => f.write_str("per-evaluation"),
        }
    }
}

/// Capabilities visible to the scripts of one session generation.
pub type CapabilityScope = Arc<Mutex<CapabilityRegistry>>;

/// State shared by every evaluation of one configurator.
#[derive(Debug, Default)]
pub struct TopologySession {
    capabilities: CapabilityScope,
    types: TypeCatalog,
    policy: ResetPolicy,
    evaluations: u64,
}

struct Inner {
    session: Mutex<TopologySession>,
    config: Arc<Configuration>,
    components: Arc<dyn ComponentRegistry>,
}

/// Evaluates topology scripts into route definition builders.
#[derive(Clone)]
pub struct RouteConfigurator {
    inner: Arc<Inner>,
}

impl RouteConfigurator {
    /// Create a configurator, reading the reset policy from
    /// `routeplane.topology.session.reset`.
    pub fn new(
        config: Arc<Configuration>,
        components: Arc<dyn ComponentRegistry>,
    ) -> Result<Self, ConfigError> {
        let policy = if config.contains(environment::SESSION_RESET) {
            config.get_parsed::<ResetPolicy, _>(environment::SESSION_RESET)?
        } else {
            ResetPolicy::default()
        };
        Ok(Self::with_policy(config, components, policy))
    }

    pub fn with_policy(
        config: Arc<Configuration>,
        components: Arc<dyn ComponentRegistry>,
        policy: ResetPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(TopologySession {
                    policy,
                    ..TopologySession::default()
                }),
                config,
                components,
            }),
        }
    }

    /// Evaluate a script and return the builder for its route block.
    pub fn configure(&self, source: &str) -> Result<RouteDefinitionBuilder, TopologyError> {
        let parsed = script::parse(source)?;

        let (block, scope) = {
            let mut session = self.session();
            if session.policy == ResetPolicy::PerEvaluation {
                let mut retained = lock_scope(&session.capabilities).clone();
                let dropped = retained.remove_by_origin(Origin::Script);
                if dropped > 0 {
                    tracing::debug!(dropped, "Reset script capabilities");
                }
                session.capabilities = Arc::new(Mutex::new(retained));
            }
            session.evaluations += 1;

            let scope = Arc::clone(&session.capabilities);
            let block = {
                let mut capabilities = lock_scope(&scope);
                let mut evaluator = Evaluator::new(
                    &mut capabilities,
                    &session.types,
                    &self.inner.config,
                    self.inner.components.as_ref(),
                    self,
                );
                evaluator.run_script(&parsed)?
            };
            (block, scope)
        };

        tracing::debug!(line = block.pos.line, statements = block.body.len(), "Route block captured");
        RouteDefinitionBuilder::new(
            Some(TopologyBlock::Script {
                block,
                scope,
                configurator: self.clone(),
            }),
            Arc::clone(&self.inner.components),
        )
    }

    pub(crate) fn evaluate_block(
        &self,
        block: &RouteBlock,
        scope: &CapabilityScope,
    ) -> Result<RouteDefinition, TopologyError> {
        let session = self.session();
        let mut capabilities = lock_scope(scope);
        let mut evaluator = Evaluator::new(
            &mut capabilities,
            &session.types,
            &self.inner.config,
            self.inner.components.as_ref(),
            self,
        );
        evaluator.run_block(block)
    }

    /// Bind a host capability to a component registry lookup.
    pub fn register_lookup(&self, name: &str, key: &str) -> Result<(), CapabilityError> {
        lock_scope(&self.scope()).register_lookup(name, key, Origin::Host)
    }

    /// Bind a host capability to an inline handler.
    pub fn register_inline<F>(&self, name: &str, handler: F) -> Result<(), CapabilityError>
    where
        F: Fn(&Args) -> Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        lock_scope(&self.scope()).register_inline(name, handler, Origin::Host)
    }

    /// Bind a host capability to construction of a type.
    pub fn register_type(
        &self,
        name: &str,
        descriptor: Option<&TypeDescriptor>,
    ) -> Result<(), CapabilityError> {
        lock_scope(&self.scope()).register_type(name, descriptor, Origin::Host)
    }

    /// Make a type available to `register_plugin` in scripts.
    pub fn register_type_descriptor(&self, descriptor: TypeDescriptor) {
        self.session().types.register(descriptor);
    }

    /// Capabilities visible to the next `configure` call.
    pub fn capability_names(&self) -> Vec<String> {
        let scope = self.scope();
        let capabilities = lock_scope(&scope);
        let names = capabilities.names().into_iter().map(str::to_string).collect();
        names
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.session().policy
    }

    /// Number of `configure` calls evaluated so far.
    pub fn evaluations(&self) -> u64 {
        self.session().evaluations
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn components(&self) -> Arc<dyn ComponentRegistry> {
        Arc::clone(&self.inner.components)
    }

    fn session(&self) -> MutexGuard<'_, TopologySession> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn scope(&self) -> CapabilityScope {
        Arc::clone(&self.session().capabilities)
    }
}

fn lock_scope(scope: &CapabilityScope) -> MutexGuard<'_, CapabilityRegistry> {
    scope.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for RouteConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfigurator")
            .field("policy", &self.reset_policy())
            .field("capabilities", &self.capability_names())
            .finish()
    }
}
