//! Startup topology loading
//!
//! [`RouteScriptLoader`] reads one topology script, from the file system or
//! from the scripts embedded in the binary (`builtin:<name>`), and evaluates
//! it. [`Bootstrapper`] installs the control channel's own topology followed
//! by any extension scripts named in the configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Configuration;
use crate::control::ControlChannel;
use crate::environment;
use crate::topology::builder::RouteDefinitionBuilder;
use crate::topology::configurator::RouteConfigurator;
use crate::topology::error::TopologyError;

const BUILTIN_PREFIX: &str = "builtin:";

const BUILTIN_SCRIPTS: &[(&str, &str)] =
    &[("bootstrap", include_str!("../scripts/bootstrap.route"))];

/// Loads and evaluates a single topology script.
#[derive(Debug, Clone)]
pub struct RouteScriptLoader {
    source: String,
    configurator: RouteConfigurator,
}

impl RouteScriptLoader {
    pub fn new(
        source: impl Into<String>,
        configurator: RouteConfigurator,
    ) -> Result<Self, TopologyError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(TopologyError::InvalidSource(
                "empty script path is not allowed".to_string(),
            ));
        }
        Ok(Self {
            source,
            configurator,
        })
    }

    /// Path or `builtin:` name this loader reads.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_builtin(&self) -> bool {
        self.source.starts_with(BUILTIN_PREFIX)
    }

    /// Read the script text.
    pub fn read(&self) -> Result<String, TopologyError> {
        if let Some(name) = self.source.strip_prefix(BUILTIN_PREFIX) {
            tracing::info!(script = name, "Loading embedded route script");
            return BUILTIN_SCRIPTS
                .iter()
                .find(|(builtin, _)| *builtin == name)
                .map(|(_, text)| text.to_string())
                .ok_or_else(|| {
                    TopologyError::InvalidSource(format!("no embedded script named `{}`", name))
                });
        }

        tracing::info!(path = %self.source, "Loading route script");
        std::fs::read_to_string(&self.source)
            .map_err(|e| TopologyError::InvalidSource(format!("{}: {}", self.source, e)))
    }

    /// Read and evaluate the script.
    pub fn load(&self) -> Result<RouteDefinitionBuilder, TopologyError> {
        let text = self.read()?;
        tracing::debug!(source = %self.source, script = %text, "Applying route script");
        self.configurator.configure(&text)
    }
}

/// Installs the startup topology on a control channel.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    config: Arc<Configuration>,
    configurator: RouteConfigurator,
}

impl Bootstrapper {
    pub fn new(config: Arc<Configuration>, configurator: RouteConfigurator) -> Self {
        Self {
            config,
            configurator,
        }
    }

    /// Scripts to load, in order: the bootstrap script, then each extension
    /// key in key order. Extensions pointing at missing files are skipped.
    pub fn scripts(&self) -> Vec<String> {
        let mut scripts = vec![self
            .config
            .get_or(environment::BOOTSTRAP_SCRIPT_URL, "builtin:bootstrap")
            .to_string()];

        for key in self.config.keys_with_prefix(environment::EXTENDED_SCRIPT_PREFIX) {
            let Ok(path) = self.config.get(key) else {
                continue;
            };
            if path.starts_with(BUILTIN_PREFIX) || Path::new(path).is_file() {
                scripts.push(path.to_string());
            } else {
                tracing::warn!(key, path, "Skipping extension script that does not exist");
            }
        }
        scripts
    }

    /// Load every startup script, returning the number of routes installed.
    pub async fn bootstrap(&self, channel: &ControlChannel) -> Result<usize> {
        tracing::info!("Bootstrapping control channel");
        let mut installed = 0;
        for script in self.scripts() {
            let loader = RouteScriptLoader::new(script.clone(), self.configurator.clone())
                .with_context(|| format!("Invalid bootstrap script path `{}`", script))?;
            installed += channel
                .load(loader)
                .await
                .with_context(|| format!("Failed to load bootstrap script `{}`", script))?;
        }
        tracing::info!(routes = installed, "Control channel bootstrapped");
        Ok(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ChannelSettings, TerminationChannel};
    use crate::engine::registry::Registry;
    use crate::engine::RoutingEngine;
    use crate::topology::configurator::ResetPolicy;
    use crate::topology::definition::Step;
    use routeplane_sdk::NoopProcessor;
    use std::io::Write;

    fn configurator(config: Configuration) -> (Arc<Configuration>, Arc<Registry>, RouteConfigurator) {
        let config = Arc::new(config);
        let registry = Arc::new(Registry::new());
        let configurator =
            RouteConfigurator::with_policy(config.clone(), registry.clone(), ResetPolicy::Retain);
        (config, registry, configurator)
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let (_, _, c) = configurator(Configuration::new());
        assert!(matches!(
            RouteScriptLoader::new("  ", c),
            Err(TopologyError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_builtin_bootstrap_script_evaluates() {
        let (_, _, c) = configurator(Configuration::from_pairs(environment::defaults()));
        let loader = RouteScriptLoader::new("builtin:bootstrap", c).unwrap();
        assert!(loader.is_builtin());

        let def = loader.load().unwrap().configure().unwrap();
        assert_eq!(def.interceptors().len(), 1);
        let routes = def.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].from.uri(), "direct:control-channel");
        assert!(matches!(routes[0].steps[0], Step::Choice { .. }));
    }

    #[test]
    fn test_unknown_builtin_and_missing_file() {
        let (_, _, c) = configurator(Configuration::new());
        let err = RouteScriptLoader::new("builtin:nope", c.clone())
            .unwrap()
            .read()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));

        let err = RouteScriptLoader::new("/no/such/script.route", c)
            .unwrap()
            .load()
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidSource(ref m) if m.contains("/no/such/script.route")));
    }

    #[test]
    fn test_scripts_order_and_missing_extensions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "route {{ from('direct:ext') }}").unwrap();
        let existing = file.path().to_string_lossy().to_string();

        let config = Configuration::from_pairs(environment::defaults())
            .with(format!("{}.b", environment::EXTENDED_SCRIPT_PREFIX), "/missing.route")
            .with(format!("{}.a", environment::EXTENDED_SCRIPT_PREFIX), existing.clone());
        let (config, _, c) = configurator(config);

        let scripts = Bootstrapper::new(config, c).scripts();
        assert_eq!(scripts, vec!["builtin:bootstrap".to_string(), existing]);
    }

    #[tokio::test]
    async fn test_bootstrap_installs_control_topology() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "route {{ from('direct:ext').to('mock:ext') }}").unwrap();

        let config = Configuration::from_pairs(environment::defaults()).with(
            format!("{}.audit", environment::EXTENDED_SCRIPT_PREFIX),
            file.path().to_string_lossy(),
        );
        let (config, registry, c) = configurator(config);
        registry.register_processor("control-channel-processor", Arc::new(NoopProcessor));
        let engine = Arc::new(RoutingEngine::new(registry));
        let channel = ControlChannel::spawn(
            engine.clone(),
            c.clone(),
            TerminationChannel::new(),
            ChannelSettings::default(),
        )
        .unwrap();

        let installed = Bootstrapper::new(config, c).bootstrap(&channel).await.unwrap();
        assert_eq!(installed, 2);
        assert_eq!(engine.route_count(), 2);
        assert_eq!(engine.interceptor_count(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_fails_without_default_processor() {
        let (config, registry, c) = configurator(Configuration::from_pairs(environment::defaults()));
        let engine = Arc::new(RoutingEngine::new(registry));
        let channel = ControlChannel::spawn(
            engine,
            c.clone(),
            TerminationChannel::new(),
            ChannelSettings::default(),
        )
        .unwrap();

        let err = Bootstrapper::new(config, c).bootstrap(&channel).await.unwrap_err();
        assert!(format!("{:#}", err).contains("control-channel-processor"));
    }
}
